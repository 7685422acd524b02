use std::collections::{HashMap, HashSet};

use crate::{
    ir::{walk_expr, walk_visit, ColumnDeclaration, DbExpr, DbRewriter, DbVisitor, Expr, SelectExpr, TableAlias},
    translator::TranslateResult,
};

/// Server-side columns plus the client expression that reads them back.
#[derive(Debug, Clone)]
pub struct ProjectedColumns {
    pub projector: Expr,
    pub columns: Vec<ColumnDeclaration>,
}

pub struct ColumnProjector;

impl ColumnProjector {
    /// Nodes that can only be evaluated by the server.
    pub fn must_be_column(expr: &DbExpr) -> bool {
        matches!(
            expr,
            DbExpr::Column(_)
                | DbExpr::SubqueryColumn(_)
                | DbExpr::Scalar(_)
                | DbExpr::Exists(_)
                | DbExpr::In(_)
                | DbExpr::Aggregate(_)
                | DbExpr::AggregateSubquery(_)
                | DbExpr::RowNumber(_)
        )
    }

    /// Scalar computations the server may evaluate on the client's behalf.
    pub fn can_be_column(expr: &DbExpr) -> bool {
        Self::must_be_column(expr)
            || matches!(
                expr,
                DbExpr::Binary(_)
                    | DbExpr::Unary(_)
                    | DbExpr::Conditional(_)
                    | DbExpr::IsNull(_)
                    | DbExpr::Between(_)
                    | DbExpr::Function(_)
            )
    }

    /// Split `expr` into column declarations for a select aliased
    /// `new_alias` and a projector over that select. Columns of
    /// `existing_aliases` are re-declared; columns of any other alias are
    /// outer references and are kept as they are.
    pub fn project_columns(
        can_be_column: fn(&DbExpr) -> bool,
        expr: &Expr,
        existing_columns: &[ColumnDeclaration],
        new_alias: TableAlias,
        existing_aliases: &[TableAlias],
    ) -> TranslateResult<ProjectedColumns> {
        let mut nominator = Nominator { can_be_column, candidates: HashSet::new(), is_blocked: false, nested: 0 };
        nominator.visit(expr);
        let mut projector = Projector {
            candidates: nominator.candidates,
            columns: existing_columns.to_vec(),
            map: HashMap::new(),
            new_alias,
            existing_aliases: existing_aliases.iter().copied().collect(),
            next_column: 0,
        };
        let projected = projector.rewrite(expr)?;
        Ok(ProjectedColumns { projector: projected, columns: projector.columns })
    }

    pub fn project(expr: &Expr, new_alias: TableAlias, existing_aliases: &[TableAlias]) -> TranslateResult<ProjectedColumns> {
        Self::project_columns(Self::can_be_column, expr, &[], new_alias, existing_aliases)
    }
}

fn key(expr: &Expr) -> *const DbExpr {
    std::sync::Arc::as_ptr(expr)
}

struct Nominator {
    can_be_column: fn(&DbExpr) -> bool,
    candidates: HashSet<*const DbExpr>,
    is_blocked: bool,
    /// Depth inside nested projections, where only plain columns (outer
    /// correlations) are lifted.
    nested: usize,
}

impl DbVisitor for Nominator {
    fn visit(&mut self, expr: &Expr) {
        let saved = self.is_blocked;
        self.is_blocked = false;
        if self.nested > 0 {
            match expr.as_ref() {
                DbExpr::Column(_) => {
                    self.candidates.insert(key(expr));
                }
                _ => walk_visit(self, expr),
            }
            self.is_blocked = true;
        } else if ColumnProjector::must_be_column(expr) {
            self.candidates.insert(key(expr));
        } else if matches!(expr.as_ref(), DbExpr::Projection(_) | DbExpr::ClientJoin(_)) {
            self.nested += 1;
            walk_visit(self, expr);
            self.nested -= 1;
            self.is_blocked = true;
        } else {
            walk_visit(self, expr);
            if !self.is_blocked {
                if (self.can_be_column)(expr) {
                    self.candidates.insert(key(expr));
                } else {
                    self.is_blocked = true;
                }
            }
        }
        self.is_blocked |= saved;
    }
}

struct Projector {
    candidates: HashSet<*const DbExpr>,
    columns: Vec<ColumnDeclaration>,
    map: HashMap<(TableAlias, String), Expr>,
    new_alias: TableAlias,
    existing_aliases: HashSet<TableAlias>,
    next_column: usize,
}

impl Projector {
    fn next_column_name(&mut self) -> String {
        loop {
            let name = format!("c{}", self.next_column);
            self.next_column += 1;
            if !self.columns.iter().any(|c| c.name == name) {
                return name;
            }
        }
    }

    fn declare(&mut self, name: String, expr: &Expr) -> Expr {
        let db_type = expr.db_type();
        self.columns.push(ColumnDeclaration { name: name.clone(), expression: expr.clone(), db_type });
        DbExpr::column(self.new_alias, name, db_type)
    }
}

impl DbRewriter for Projector {
    fn rewrite(&mut self, expr: &Expr) -> TranslateResult<Expr> {
        if !self.candidates.contains(&key(expr)) {
            return walk_expr(self, expr);
        }
        let DbExpr::Column(column) = expr.as_ref() else {
            let name = self.next_column_name();
            return Ok(self.declare(name, expr));
        };
        let map_key = (column.alias, column.name.clone());
        if let Some(mapped) = self.map.get(&map_key) {
            return Ok(mapped.clone());
        }
        let existing = self.columns.iter().find(|d| {
            d.expression.as_column().is_some_and(|c| c.alias == column.alias && c.name == column.name)
        });
        if let Some(d) = existing {
            return Ok(DbExpr::column(self.new_alias, d.name.clone(), d.db_type));
        }
        if self.existing_aliases.contains(&column.alias) {
            let name = SelectExpr::available_name(&self.columns, &column.name);
            let mapped = self.declare(name, expr);
            self.map.insert(map_key, mapped.clone());
            return Ok(mapped);
        }
        Ok(expr.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ir::{AggregateKind, BinaryOp, DbType, NewExpr, ProjectionExpr};

    #[test]
    fn columns_of_source_are_redeclared_and_shared() {
        let (t, n) = (TableAlias::new(), TableAlias::new());
        let name = DbExpr::column(t, "Name", DbType::String);
        let expr = DbExpr::new_record(vec![
            ("a".into(), name.clone()),
            ("b".into(), DbExpr::column(t, "Name", DbType::String)),
            ("c".into(), DbExpr::literal(1)),
        ]);
        let pc = ColumnProjector::project(&expr, n, &[t]).unwrap();
        assert_eq!(pc.columns.len(), 1);
        assert_eq!(pc.columns[0].name, "Name");
        let DbExpr::New(NewExpr { members }) = pc.projector.as_ref() else { panic!("new expected") };
        assert_eq!(members[0].1.as_column().unwrap().alias, n);
        assert_eq!(members[1].1.as_column().unwrap().name, "Name");
        assert!(members[2].1.as_literal().is_some());
    }

    #[test]
    fn computed_values_get_generated_names() {
        let (t, n) = (TableAlias::new(), TableAlias::new());
        let sum = DbExpr::binary(BinaryOp::Add, DbExpr::column(t, "A", DbType::Int), DbExpr::column(t, "B", DbType::Int));
        let count = DbExpr::aggregate(AggregateKind::Count, None, false);
        let expr = DbExpr::new_record(vec![("s".into(), sum), ("n".into(), count)]);
        let existing = vec![ColumnDeclaration::new("c0", DbExpr::literal(0))];
        let pc = ColumnProjector::project_columns(ColumnProjector::can_be_column, &expr, &existing, n, &[t]).unwrap();
        let names: Vec<&str> = pc.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["c0", "c1", "c2"]);
    }

    #[test]
    fn outer_references_are_left_alone() {
        let (t, outer, n) = (TableAlias::new(), TableAlias::new(), TableAlias::new());
        let e = DbExpr::equal(DbExpr::column(t, "X", DbType::Int), DbExpr::column(outer, "Y", DbType::Int));
        let pc = ColumnProjector::project_columns(ColumnProjector::must_be_column, &e, &[], n, &[t]).unwrap();
        assert_eq!(pc.columns.len(), 1);
        let DbExpr::Binary(b) = pc.projector.as_ref() else { panic!("binary expected") };
        assert_eq!(b.right.as_column().unwrap().alias, outer);
    }

    #[test]
    fn nested_projection_only_lifts_correlated_columns() {
        let (t, inner_t, inner_s, n) = (TableAlias::new(), TableAlias::new(), TableAlias::new(), TableAlias::new());
        let inner_sel = SelectExpr::new(
            inner_s,
            vec![ColumnDeclaration::new("c", DbExpr::aggregate(AggregateKind::Count, None, false))],
            None,
            Some(DbExpr::equal(DbExpr::column(inner_t, "CustomerID", DbType::Int), DbExpr::column(t, "ID", DbType::Int))),
        );
        let nested = ProjectionExpr::new(Arc::new(inner_sel), DbExpr::column(inner_s, "c", DbType::Int), None).into_expr();
        let pc = ColumnProjector::project(&nested, n, &[t]).unwrap();
        assert_eq!(pc.columns.len(), 1);
        assert_eq!(pc.columns[0].name, "ID");
    }
}
