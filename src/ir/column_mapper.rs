use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    ir::{
        walk_expr, walk_select, walk_visit, walk_visit_select, ColumnExpr, DbExpr, DbRewriter, DbVisitor, Expr,
        SelectExpr, TableAlias, TableExpr,
    },
    translator::{TranslateError, TranslateResult},
};

/// Re-point columns of a set of old aliases at a new alias, keeping names.
pub struct ColumnMapper {
    old_aliases: HashSet<TableAlias>,
    new_alias: TableAlias,
}

impl ColumnMapper {
    pub fn map(expr: &Expr, new_alias: TableAlias, old_aliases: impl IntoIterator<Item = TableAlias>) -> TranslateResult<Expr> {
        let mut m = ColumnMapper { old_aliases: old_aliases.into_iter().collect(), new_alias };
        m.rewrite(expr)
    }
}

impl DbRewriter for ColumnMapper {
    fn rewrite_column(&mut self, expr: &Expr, column: &ColumnExpr) -> TranslateResult<Expr> {
        if self.old_aliases.contains(&column.alias) {
            Ok(DbExpr::column(self.new_alias, column.name.clone(), column.db_type))
        } else {
            Ok(expr.clone())
        }
    }
}

/// Replace columns of the given aliases with the expression their owner
/// declared under that name. A referenced name with no mapping is a bug in
/// the calling pass.
pub struct ColumnReplacer<'a> {
    map: &'a HashMap<TableAlias, HashMap<String, Expr>>,
}

impl<'a> ColumnReplacer<'a> {
    pub fn replace(expr: &Expr, map: &'a HashMap<TableAlias, HashMap<String, Expr>>) -> TranslateResult<Expr> {
        ColumnReplacer { map }.rewrite(expr)
    }

    pub fn new(map: &'a HashMap<TableAlias, HashMap<String, Expr>>) -> Self {
        ColumnReplacer { map }
    }
}

impl DbRewriter for ColumnReplacer<'_> {
    fn rewrite_column(&mut self, expr: &Expr, column: &ColumnExpr) -> TranslateResult<Expr> {
        match self.map.get(&column.alias) {
            None => Ok(expr.clone()),
            Some(names) => names.get(&column.name).cloned().ok_or_else(|| TranslateError::UndefinedReference {
                alias: column.alias,
                column: column.name.clone(),
            }),
        }
    }
}

/// Copy of a tree with every alias it declares replaced by a fresh one, so
/// the copy can live next to the original without sharing identities.
pub struct QueryDuplicator {
    map: HashMap<TableAlias, TableAlias>,
}

impl QueryDuplicator {
    pub fn duplicate(expr: &Expr) -> TranslateResult<Expr> {
        let mut declared = DeclaredAnywhere(HashMap::new());
        declared.visit(expr);
        QueryDuplicator { map: declared.0 }.rewrite(expr)
    }

    fn renamed(&self, alias: TableAlias) -> TableAlias {
        self.map.get(&alias).copied().unwrap_or(alias)
    }
}

struct DeclaredAnywhere(HashMap<TableAlias, TableAlias>);

impl DbVisitor for DeclaredAnywhere {
    fn visit(&mut self, expr: &Expr) {
        if let DbExpr::Table(t) = expr.as_ref() {
            self.0.insert(t.alias, TableAlias::new());
        }
        walk_visit(self, expr)
    }

    fn visit_select(&mut self, select: &SelectExpr) {
        self.0.insert(select.alias, TableAlias::new());
        walk_visit_select(self, select)
    }
}

impl DbRewriter for QueryDuplicator {
    fn rewrite(&mut self, expr: &Expr) -> TranslateResult<Expr> {
        match expr.as_ref() {
            DbExpr::Table(t) => Ok(Arc::new(DbExpr::Table(TableExpr { alias: self.renamed(t.alias), ..t.clone() }))),
            _ => walk_expr(self, expr),
        }
    }

    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let rewritten = walk_select(self, select)?;
        Ok(Arc::new(SelectExpr { alias: self.renamed(select.alias), ..(*rewritten).clone() }))
    }

    fn rewrite_column(&mut self, expr: &Expr, column: &ColumnExpr) -> TranslateResult<Expr> {
        match self.map.get(&column.alias) {
            Some(alias) => Ok(DbExpr::column(*alias, column.name.clone(), column.db_type)),
            None => Ok(expr.clone()),
        }
    }
}
