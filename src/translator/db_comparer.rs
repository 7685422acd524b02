use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    mem::discriminant,
    sync::Arc,
};

use crate::ir::{
    AliasGatherer, ColumnAssignment, ColumnDeclaration, DbExpr, Expr, InSource, OrderExpr, ProjectionExpr, SelectExpr,
    TableAlias,
};

/// Structural equality of IR fragments, treating two aliases as equal when
/// they are declared at corresponding positions of the trees being compared.
#[derive(Debug, Default)]
pub struct DbComparer {
    scope: Vec<(TableAlias, TableAlias)>,
}

impl DbComparer {
    pub fn are_equal(a: &Expr, b: &Expr) -> bool {
        DbComparer::default().eq(a, b)
    }

    pub fn are_equal_in_scope(a: &Expr, b: &Expr, scope: &[(TableAlias, TableAlias)]) -> bool {
        DbComparer { scope: scope.to_vec() }.eq(a, b)
    }

    pub fn selects_equal(a: &SelectExpr, b: &SelectExpr) -> bool {
        DbComparer::default().select_eq(a, b)
    }

    fn alias_eq(&self, a: TableAlias, b: TableAlias) -> bool {
        for (x, y) in self.scope.iter().rev() {
            if *x == a {
                return *y == b;
            }
        }
        a == b
    }

    /// Pair the aliases declared by two sources; `None` when their shapes differ.
    fn declared_pairs(a: &Expr, b: &Expr) -> Option<Vec<(TableAlias, TableAlias)>> {
        let (da, db) = (AliasGatherer::declared(a), AliasGatherer::declared(b));
        (da.len() == db.len()).then(|| da.into_iter().zip(db).collect())
    }

    fn opt_eq(&mut self, a: &Option<Expr>, b: &Option<Expr>) -> bool {
        match (a, b) {
            (Some(x), Some(y)) => self.eq(x, y),
            (None, None) => true,
            _ => false,
        }
    }

    fn list_eq(&mut self, a: &[Expr], b: &[Expr]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.eq(x, y))
    }

    fn orders_eq(&mut self, a: &[OrderExpr], b: &[OrderExpr]) -> bool {
        a.len() == b.len()
            && a.iter().zip(b).all(|(x, y)| x.order_type == y.order_type && self.eq(&x.expression, &y.expression))
    }

    fn columns_eq(&mut self, a: &[ColumnDeclaration], b: &[ColumnDeclaration]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.name == y.name && self.eq(&x.expression, &y.expression))
    }

    fn assignments_eq(&mut self, a: &[ColumnAssignment], b: &[ColumnAssignment]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.column == y.column && self.eq(&x.value, &y.value))
    }

    pub fn select_eq(&mut self, a: &SelectExpr, b: &SelectExpr) -> bool {
        let mark = self.scope.len();
        let result = self.select_eq_scoped(a, b);
        self.scope.truncate(mark);
        result
    }

    fn select_eq_scoped(&mut self, a: &SelectExpr, b: &SelectExpr) -> bool {
        match (&a.from, &b.from) {
            (Some(fa), Some(fb)) => {
                if !self.eq(fa, fb) {
                    return false;
                }
                match Self::declared_pairs(fa, fb) {
                    Some(pairs) => self.scope.extend(pairs),
                    None => return false,
                }
            }
            (None, None) => {}
            _ => return false,
        }
        a.is_distinct == b.is_distinct
            && a.is_reverse == b.is_reverse
            && a.segment == b.segment
            && self.opt_eq(&a.where_clause, &b.where_clause)
            && self.orders_eq(&a.order_by, &b.order_by)
            && self.list_eq(&a.group_by, &b.group_by)
            && self.opt_eq(&a.having, &b.having)
            && self.opt_eq(&a.skip, &b.skip)
            && self.opt_eq(&a.take, &b.take)
            && self.columns_eq(&a.columns, &b.columns)
    }

    fn projection_eq(&mut self, a: &ProjectionExpr, b: &ProjectionExpr) -> bool {
        if a.aggregator != b.aggregator || !self.select_eq(&a.select, &b.select) {
            return false;
        }
        let mark = self.scope.len();
        self.scope.push((a.select.alias, b.select.alias));
        let result = self.eq(&a.projector, &b.projector);
        self.scope.truncate(mark);
        result
    }

    pub fn eq(&mut self, a: &Expr, b: &Expr) -> bool {
        if self.scope.is_empty() && Arc::ptr_eq(a, b) {
            return true;
        }
        match (a.as_ref(), b.as_ref()) {
            (DbExpr::Literal(x), DbExpr::Literal(y)) => x == y,
            (DbExpr::Variable(x), DbExpr::Variable(y)) => x.name == y.name && x.value == y.value,
            (DbExpr::NamedValue(x), DbExpr::NamedValue(y)) => x.name == y.name && self.eq(&x.value, &y.value),
            (DbExpr::Column(x), DbExpr::Column(y)) => x.name == y.name && self.alias_eq(x.alias, y.alias),
            (DbExpr::SubqueryColumn(x), DbExpr::SubqueryColumn(y)) => {
                x.name == y.name && x.template == y.template && self.alias_eq(x.alias, y.alias)
            }
            (DbExpr::Binary(x), DbExpr::Binary(y)) => x.op == y.op && self.eq(&x.left, &y.left) && self.eq(&x.right, &y.right),
            (DbExpr::Unary(x), DbExpr::Unary(y)) => x.op == y.op && self.eq(&x.operand, &y.operand),
            (DbExpr::Conditional(x), DbExpr::Conditional(y)) => {
                self.eq(&x.test, &y.test) && self.eq(&x.if_true, &y.if_true) && self.eq(&x.if_false, &y.if_false)
            }
            (DbExpr::IsNull(x), DbExpr::IsNull(y)) => self.eq(x, y),
            (DbExpr::Between(x), DbExpr::Between(y)) => {
                self.eq(&x.arg, &y.arg) && self.eq(&x.lower, &y.lower) && self.eq(&x.upper, &y.upper)
            }
            (DbExpr::Function(x), DbExpr::Function(y)) => x.name == y.name && self.list_eq(&x.args, &y.args),
            (DbExpr::RowNumber(x), DbExpr::RowNumber(y)) => self.orders_eq(x, y),
            (DbExpr::Aggregate(x), DbExpr::Aggregate(y)) => {
                x.kind == y.kind && x.is_distinct == y.is_distinct && self.opt_eq(&x.argument, &y.argument)
            }
            (DbExpr::AggregateSubquery(x), DbExpr::AggregateSubquery(y)) => {
                self.alias_eq(x.group_by_alias, y.group_by_alias)
                    && self.select_eq(&x.aggregate_as_subquery, &y.aggregate_as_subquery)
            }
            (DbExpr::Scalar(x), DbExpr::Scalar(y)) | (DbExpr::Exists(x), DbExpr::Exists(y)) => self.select_eq(x, y),
            (DbExpr::In(x), DbExpr::In(y)) => {
                self.eq(&x.expr, &y.expr)
                    && match (&x.source, &y.source) {
                        (InSource::Select(s), InSource::Select(t)) => self.select_eq(s, t),
                        (InSource::Values(s), InSource::Values(t)) => self.list_eq(s, t),
                        _ => false,
                    }
            }
            (DbExpr::Table(x), DbExpr::Table(y)) => x.name == y.name,
            (DbExpr::Select(x), DbExpr::Select(y)) => self.select_eq(x, y),
            (DbExpr::Join(x), DbExpr::Join(y)) => {
                if x.join_type != y.join_type || !self.eq(&x.left, &y.left) || !self.eq(&x.right, &y.right) {
                    return false;
                }
                let mark = self.scope.len();
                let ok = match (Self::declared_pairs(&x.left, &y.left), Self::declared_pairs(&x.right, &y.right)) {
                    (Some(l), Some(r)) => {
                        self.scope.extend(l);
                        self.scope.extend(r);
                        self.opt_eq(&x.condition, &y.condition)
                    }
                    _ => false,
                };
                self.scope.truncate(mark);
                ok
            }
            (DbExpr::Projection(x), DbExpr::Projection(y)) => self.projection_eq(x, y),
            (DbExpr::ClientJoin(x), DbExpr::ClientJoin(y)) => {
                self.list_eq(&x.outer_key, &y.outer_key)
                    && self.projection_eq(&x.projection, &y.projection)
                    && {
                        let mark = self.scope.len();
                        self.scope.push((x.projection.select.alias, y.projection.select.alias));
                        let ok = self.list_eq(&x.inner_key, &y.inner_key);
                        self.scope.truncate(mark);
                        ok
                    }
            }
            (DbExpr::OuterJoined(x), DbExpr::OuterJoined(y)) => self.eq(&x.test, &y.test) && self.eq(&x.expr, &y.expr),
            (DbExpr::New(x), DbExpr::New(y)) => {
                x.members.len() == y.members.len()
                    && x.members.iter().zip(&y.members).all(|((n1, e1), (n2, e2))| n1 == n2 && self.eq(e1, e2))
            }
            (DbExpr::Entity(x), DbExpr::Entity(y)) => x.entity == y.entity && self.eq(&x.init, &y.init),
            (DbExpr::Member(x), DbExpr::Member(y)) => x.member == y.member && self.eq(&x.expr, &y.expr),
            (DbExpr::Grouping(x), DbExpr::Grouping(y)) => self.eq(&x.key, &y.key) && self.eq(&x.elements, &y.elements),
            (DbExpr::Insert(x), DbExpr::Insert(y)) => {
                x.table.name == y.table.name && self.assignments_eq(&x.assignments, &y.assignments)
            }
            (DbExpr::Update(x), DbExpr::Update(y)) => {
                x.table.name == y.table.name
                    && self.scoped_pair(x.table.alias, y.table.alias, |c| {
                        c.opt_eq(&x.where_clause, &y.where_clause) && c.assignments_eq(&x.assignments, &y.assignments)
                    })
            }
            (DbExpr::Delete(x), DbExpr::Delete(y)) => {
                x.table.name == y.table.name
                    && self.scoped_pair(x.table.alias, y.table.alias, |c| c.opt_eq(&x.where_clause, &y.where_clause))
            }
            (DbExpr::Block(x), DbExpr::Block(y)) => self.list_eq(x, y),
            _ => false,
        }
    }

    fn scoped_pair(&mut self, a: TableAlias, b: TableAlias, f: impl FnOnce(&mut Self) -> bool) -> bool {
        let mark = self.scope.len();
        self.scope.push((a, b));
        let result = f(self);
        self.scope.truncate(mark);
        result
    }
}

/// Hash that ignores alias identity, consistent with [`DbComparer`]: equal
/// trees always hash equal.
pub fn structural_hash(expr: &Expr) -> u64 {
    let mut h = DefaultHasher::new();
    hash_into(expr, &mut h);
    h.finish()
}

fn hash_into(expr: &Expr, h: &mut DefaultHasher) {
    discriminant(expr.as_ref()).hash(h);
    match expr.as_ref() {
        DbExpr::Literal(l) => l.hash(h),
        DbExpr::Variable(v) => {
            v.name.hash(h);
            v.value.hash(h);
        }
        DbExpr::NamedValue(n) => n.name.hash(h),
        DbExpr::Column(c) => c.name.hash(h),
        DbExpr::SubqueryColumn(c) => c.name.hash(h),
        DbExpr::Binary(b) => {
            b.op.hash(h);
            hash_into(&b.left, h);
            hash_into(&b.right, h);
        }
        DbExpr::Unary(u) => {
            u.op.hash(h);
            hash_into(&u.operand, h);
        }
        DbExpr::Function(f) => {
            f.name.hash(h);
            f.args.iter().for_each(|a| hash_into(a, h));
        }
        DbExpr::Aggregate(a) => {
            a.kind.hash(h);
            a.is_distinct.hash(h);
        }
        DbExpr::Table(t) => t.name.hash(h),
        DbExpr::IsNull(e) => hash_into(e, h),
        DbExpr::Conditional(c) => {
            hash_into(&c.test, h);
            hash_into(&c.if_true, h);
            hash_into(&c.if_false, h);
        }
        DbExpr::Member(m) => {
            m.member.hash(h);
            hash_into(&m.expr, h);
        }
        DbExpr::Select(s) | DbExpr::Scalar(s) | DbExpr::Exists(s) => {
            s.columns.iter().for_each(|c| c.name.hash(h));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DbType, JoinType, TableExpr};

    fn table(name: &str) -> (TableAlias, Expr) {
        let a = TableAlias::new();
        (a, Arc::new(DbExpr::Table(TableExpr { alias: a, name: name.into(), entity: name.into() })))
    }

    fn customers_over_orders() -> Expr {
        let (c, tc) = table("Customers");
        let (o, to) = table("Orders");
        let cond = DbExpr::equal(DbExpr::column(c, "ID", DbType::Int), DbExpr::column(o, "CustomerID", DbType::Int));
        let join = DbExpr::join(JoinType::InnerJoin, tc, to, Some(cond));
        let sel = SelectExpr::new(
            TableAlias::new(),
            vec![ColumnDeclaration::new("Name", DbExpr::column(c, "Name", DbType::String))],
            Some(join),
            Some(DbExpr::equal(DbExpr::column(o, "Total", DbType::Int), DbExpr::literal(5))),
        );
        DbExpr::select(sel)
    }

    #[test]
    fn same_shape_with_fresh_aliases_is_equal() {
        let a = customers_over_orders();
        let b = customers_over_orders();
        assert!(DbComparer::are_equal(&a, &b));
        assert_eq!(structural_hash(&a), structural_hash(&b));
    }

    #[test]
    fn undeclared_alias_mismatch_is_unequal() {
        let (a, b) = (TableAlias::new(), TableAlias::new());
        let x = DbExpr::column(a, "ID", DbType::Int);
        let y = DbExpr::column(b, "ID", DbType::Int);
        assert!(!DbComparer::are_equal(&x, &y));
        assert!(DbComparer::are_equal_in_scope(&x, &y, &[(a, b)]));
    }

    #[test]
    fn different_literal_is_unequal() {
        let (t, tt) = table("T");
        let mk = |v: i64| {
            DbExpr::select(SelectExpr::new(
                TableAlias::new(),
                vec![ColumnDeclaration::new("x", DbExpr::column(t, "x", DbType::Int))],
                Some(tt.clone()),
                Some(DbExpr::equal(DbExpr::column(t, "x", DbType::Int), DbExpr::literal(v))),
            ))
        };
        assert!(DbComparer::are_equal(&mk(1), &mk(1)));
        assert!(!DbComparer::are_equal(&mk(1), &mk(2)));
    }
}
