use std::{collections::HashMap, mem, sync::Arc};

use crate::{
    ir::{
        walk_children, walk_select, AliasGatherer, ColumnDeclaration, ColumnExpr, ColumnGatherer, DbExpr, DbRewriter,
        Expr, JoinExpr, JoinType, SelectExpr, TableAlias,
    },
    translator::TranslateResult,
};

/// Wraps a cross join that sits directly under a non-cross join (or the
/// reverse) in its own subquery, since mixing comma joins with explicit
/// joins is not portable.
#[derive(Default)]
pub struct CrossJoinIsolator {
    columns: HashMap<TableAlias, Vec<ColumnExpr>>,
    map: HashMap<(TableAlias, String), Expr>,
    last_join: Option<JoinType>,
}

impl CrossJoinIsolator {
    pub fn isolate(expr: &Expr) -> TranslateResult<Expr> {
        Self::default().rewrite(expr)
    }

    fn make_subquery(&mut self, expr: &Expr) -> Expr {
        let new_alias = TableAlias::new();
        let mut declarations: Vec<ColumnDeclaration> = Vec::new();
        for alias in AliasGatherer::declared(expr) {
            for column in self.columns.get(&alias).cloned().unwrap_or_default() {
                let name = SelectExpr::available_name(&declarations, &column.name);
                declarations.push(ColumnDeclaration {
                    name: name.clone(),
                    expression: DbExpr::column(column.alias, column.name.clone(), column.db_type),
                    db_type: column.db_type,
                });
                self.map.insert((column.alias, column.name), DbExpr::column(new_alias, name, column.db_type));
            }
        }
        DbExpr::select(SelectExpr::new(new_alias, declarations, Some(expr.clone()), None))
    }
}

impl DbRewriter for CrossJoinIsolator {
    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let mut gathered: HashMap<TableAlias, Vec<ColumnExpr>> = HashMap::new();
        for column in ColumnGatherer::columns(&DbExpr::from_select(select.clone())) {
            gathered.entry(column.alias).or_default().push(column);
        }
        let saved_columns = mem::replace(&mut self.columns, gathered);
        let saved_join = self.last_join.take();
        let result = walk_select(self, select);
        self.columns = saved_columns;
        self.last_join = saved_join;
        result
    }

    fn rewrite_join(&mut self, expr: &Expr, join: &JoinExpr) -> TranslateResult<Expr> {
        let saved = self.last_join.replace(join.join_type);
        let result = walk_children(self, expr);
        self.last_join = saved;
        let result = result?;
        let is_cross = join.join_type == JoinType::CrossJoin;
        match self.last_join {
            Some(parent) if is_cross != (parent == JoinType::CrossJoin) => Ok(self.make_subquery(&result)),
            _ => Ok(result),
        }
    }

    fn rewrite_column(&mut self, expr: &Expr, column: &ColumnExpr) -> TranslateResult<Expr> {
        Ok(self.map.get(&(column.alias, column.name.clone())).cloned().unwrap_or_else(|| expr.clone()))
    }
}
