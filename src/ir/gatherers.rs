use std::collections::HashSet;

use indexmap::IndexSet;

use crate::ir::{
    walk_visit, ColumnExpr, DbExpr, DbVisitor, Expr, InSource, SelectExpr, TableAlias,
};

pub struct AliasGatherer;

impl AliasGatherer {
    /// Aliases introduced by a `from` subtree, left to right. Does not look
    /// inside selects: their inner aliases are out of scope for the parent.
    pub fn declared(expr: &Expr) -> Vec<TableAlias> {
        let mut out = Vec::new();
        Self::collect_declared(expr, &mut out);
        out
    }

    fn collect_declared(expr: &Expr, out: &mut Vec<TableAlias>) {
        match expr.as_ref() {
            DbExpr::Table(t) => out.push(t.alias),
            DbExpr::Select(s) => out.push(s.alias),
            DbExpr::Join(j) => {
                Self::collect_declared(&j.left, out);
                Self::collect_declared(&j.right, out);
            }
            _ => {}
        }
    }

    /// Every alias some column below `expr` points at.
    pub fn referenced(expr: &Expr) -> HashSet<TableAlias> {
        let mut g = ReferencedAliases(HashSet::new());
        g.visit(expr);
        g.0
    }

    pub fn referenced_in_select(select: &SelectExpr) -> HashSet<TableAlias> {
        let mut g = ReferencedAliases(HashSet::new());
        g.visit_select(select);
        g.0
    }
}

struct ReferencedAliases(HashSet<TableAlias>);

impl DbVisitor for ReferencedAliases {
    fn visit_column(&mut self, column: &ColumnExpr) {
        self.0.insert(column.alias);
    }
}

pub struct ColumnGatherer;

impl ColumnGatherer {
    /// Distinct (alias, name) column references below `expr`, in visit order.
    pub fn columns(expr: &Expr) -> Vec<ColumnExpr> {
        let mut g = Columns { seen: IndexSet::new(), out: Vec::new() };
        g.visit(expr);
        g.out
    }
}

struct Columns {
    seen: IndexSet<(TableAlias, String)>,
    out: Vec<ColumnExpr>,
}

impl DbVisitor for Columns {
    fn visit_column(&mut self, column: &ColumnExpr) {
        if self.seen.insert((column.alias, column.name.clone())) {
            self.out.push(column.clone());
        }
    }
}

pub struct AggregateChecker;

impl AggregateChecker {
    /// Whether a select computes aggregates at its own level (columns,
    /// having, order or where), ignoring nested subqueries.
    pub fn has_aggregates(select: &SelectExpr) -> bool {
        let mut c = HasAggregate(false);
        for col in &select.columns {
            c.visit(&col.expression);
        }
        for o in &select.order_by {
            c.visit(&o.expression);
        }
        for e in [&select.where_clause, &select.having].into_iter().flatten() {
            c.visit(e);
        }
        c.0
    }

    pub fn contains_aggregate(expr: &Expr) -> bool {
        let mut c = HasAggregate(false);
        c.visit(expr);
        c.0
    }
}

struct HasAggregate(bool);

impl DbVisitor for HasAggregate {
    fn visit(&mut self, expr: &Expr) {
        if self.0 {
            return;
        }
        match expr.as_ref() {
            DbExpr::Aggregate(_) | DbExpr::AggregateSubquery(_) => self.0 = true,
            DbExpr::Scalar(_) | DbExpr::Exists(_) | DbExpr::Select(_) => {}
            DbExpr::In(i) => {
                self.visit(&i.expr);
                if let InSource::Values(values) = &i.source {
                    values.iter().for_each(|v| self.visit(v));
                }
            }
            _ => walk_visit(self, expr),
        }
    }
}

pub struct CountStarChecker;

impl CountStarChecker {
    /// `COUNT(*)` with no argument anywhere in the select's own columns.
    pub fn has_count_star(select: &SelectExpr) -> bool {
        select.columns.iter().any(|c| Self::is_count_star(&c.expression))
    }

    fn is_count_star(expr: &Expr) -> bool {
        match expr.as_ref() {
            DbExpr::Aggregate(a) => a.argument.is_none(),
            DbExpr::Binary(b) => Self::is_count_star(&b.left) || Self::is_count_star(&b.right),
            DbExpr::Unary(u) => Self::is_count_star(&u.operand),
            DbExpr::Conditional(c) => {
                Self::is_count_star(&c.test) || Self::is_count_star(&c.if_true) || Self::is_count_star(&c.if_false)
            }
            DbExpr::Function(f) => f.args.iter().any(Self::is_count_star),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ir::{AggregateKind, ColumnDeclaration, DbType, JoinType, TableExpr};

    fn table(name: &str) -> (TableAlias, Expr) {
        let a = TableAlias::new();
        (a, Arc::new(DbExpr::Table(TableExpr { alias: a, name: name.into(), entity: name.into() })))
    }

    #[test]
    fn declared_follows_join_spine_left_to_right() {
        let (a, ta) = table("A");
        let (b, tb) = table("B");
        let (c, tc) = table("C");
        let j = DbExpr::join(JoinType::InnerJoin, DbExpr::join(JoinType::CrossJoin, ta, tb, None), tc, None);
        assert_eq!(AliasGatherer::declared(&j), vec![a, b, c]);
    }

    #[test]
    fn referenced_and_columns() {
        let (a, _) = table("A");
        let (b, _) = table("B");
        let e = DbExpr::and(
            DbExpr::equal(DbExpr::column(a, "x", DbType::Int), DbExpr::column(b, "y", DbType::Int)),
            DbExpr::is_null_test(DbExpr::column(a, "x", DbType::Int)),
        );
        let refs = AliasGatherer::referenced(&e);
        assert!(refs.contains(&a) && refs.contains(&b));
        assert_eq!(ColumnGatherer::columns(&e).len(), 2);
    }

    #[test]
    fn aggregates_detected_at_own_level_only() {
        let (a, ta) = table("A");
        let inner = SelectExpr::new(
            TableAlias::new(),
            vec![ColumnDeclaration::new("c", DbExpr::aggregate(AggregateKind::Count, None, false))],
            Some(ta.clone()),
            None,
        );
        let outer = SelectExpr::new(
            TableAlias::new(),
            vec![
                ColumnDeclaration::new("x", DbExpr::column(a, "x", DbType::Int)),
                ColumnDeclaration::new("n", Arc::new(DbExpr::Scalar(Arc::new(inner.clone())))),
            ],
            Some(ta),
            None,
        );
        assert!(AggregateChecker::has_aggregates(&inner));
        assert!(CountStarChecker::has_count_star(&inner));
        assert!(!AggregateChecker::has_aggregates(&outer));
    }
}
