use std::sync::Arc;

use crate::{
    ir::{
        AggregateExpr, AggregateSubqueryExpr, BetweenExpr, BinaryExpr, ClientJoinExpr, ColumnAssignment,
        ColumnDeclaration, ColumnExpr, ConditionalExpr, DbExpr, DeleteCommand, EntityExpr, Expr, FunctionExpr,
        GroupingExpr, InExpr, InSource, InsertCommand, JoinExpr, MemberExpr, NamedValue, NewExpr, OrderExpr,
        OuterJoinedExpr, ProjectionExpr, SelectExpr, UnaryExpr, UpdateCommand,
    },
    translator::{TranslateError, TranslateResult},
};

/// Bottom-up tree rewriter. Every hook defaults to rebuilding the node from
/// its rewritten children, reusing the original `Arc` when no child changed.
pub trait DbRewriter {
    fn rewrite(&mut self, expr: &Expr) -> TranslateResult<Expr> {
        walk_expr(self, expr)
    }

    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        walk_select(self, select)
    }

    fn rewrite_column(&mut self, expr: &Expr, _column: &ColumnExpr) -> TranslateResult<Expr> {
        Ok(expr.clone())
    }

    fn rewrite_join(&mut self, expr: &Expr, _join: &JoinExpr) -> TranslateResult<Expr> {
        walk_children(self, expr)
    }

    fn rewrite_projection(&mut self, expr: &Expr, _projection: &ProjectionExpr) -> TranslateResult<Expr> {
        walk_children(self, expr)
    }

    fn rewrite_client_join(&mut self, expr: &Expr, _join: &ClientJoinExpr) -> TranslateResult<Expr> {
        walk_children(self, expr)
    }

    fn rewrite_aggregate(&mut self, expr: &Expr, _aggregate: &AggregateExpr) -> TranslateResult<Expr> {
        walk_children(self, expr)
    }

    fn rewrite_aggregate_subquery(&mut self, expr: &Expr, _aggregate: &AggregateSubqueryExpr) -> TranslateResult<Expr> {
        walk_children(self, expr)
    }

    /// `Scalar`, `Exists` and `In` nodes.
    fn rewrite_subquery(&mut self, expr: &Expr) -> TranslateResult<Expr> {
        walk_children(self, expr)
    }

    fn rewrite_binary(&mut self, expr: &Expr, _binary: &BinaryExpr) -> TranslateResult<Expr> {
        walk_children(self, expr)
    }

    fn rewrite_member(&mut self, expr: &Expr, _member: &MemberExpr) -> TranslateResult<Expr> {
        walk_children(self, expr)
    }

    fn rewrite_entity(&mut self, expr: &Expr, _entity: &EntityExpr) -> TranslateResult<Expr> {
        walk_children(self, expr)
    }
}

/// Dispatch on node kind to the matching hook.
pub fn walk_expr<R: DbRewriter + ?Sized>(r: &mut R, expr: &Expr) -> TranslateResult<Expr> {
    match expr.as_ref() {
        DbExpr::Column(c) => r.rewrite_column(expr, c),
        DbExpr::Select(s) => {
            let ns = r.rewrite_select(s)?;
            Ok(if Arc::ptr_eq(&ns, s) { expr.clone() } else { DbExpr::from_select(ns) })
        }
        DbExpr::Join(j) => r.rewrite_join(expr, j),
        DbExpr::Projection(p) => r.rewrite_projection(expr, p),
        DbExpr::ClientJoin(c) => r.rewrite_client_join(expr, c),
        DbExpr::Aggregate(a) => r.rewrite_aggregate(expr, a),
        DbExpr::AggregateSubquery(a) => r.rewrite_aggregate_subquery(expr, a),
        DbExpr::Scalar(_) | DbExpr::Exists(_) | DbExpr::In(_) => r.rewrite_subquery(expr),
        DbExpr::Binary(b) => r.rewrite_binary(expr, b),
        DbExpr::Member(m) => r.rewrite_member(expr, m),
        DbExpr::Entity(e) => r.rewrite_entity(expr, e),
        _ => walk_children(r, expr),
    }
}

fn changed(a: &Expr, b: &Expr) -> bool {
    !Arc::ptr_eq(a, b)
}

pub fn rewrite_opt<R: DbRewriter + ?Sized>(r: &mut R, expr: &Option<Expr>) -> TranslateResult<(Option<Expr>, bool)> {
    match expr {
        Some(e) => {
            let ne = r.rewrite(e)?;
            let diff = changed(e, &ne);
            Ok((Some(ne), diff))
        }
        None => Ok((None, false)),
    }
}

pub fn rewrite_list<R: DbRewriter + ?Sized>(r: &mut R, list: &[Expr]) -> TranslateResult<(Vec<Expr>, bool)> {
    let mut diff = false;
    let mut out = Vec::with_capacity(list.len());
    for e in list {
        let ne = r.rewrite(e)?;
        diff |= changed(e, &ne);
        out.push(ne);
    }
    Ok((out, diff))
}

pub fn rewrite_orders<R: DbRewriter + ?Sized>(r: &mut R, orders: &[OrderExpr]) -> TranslateResult<(Vec<OrderExpr>, bool)> {
    let mut diff = false;
    let mut out = Vec::with_capacity(orders.len());
    for o in orders {
        let ne = r.rewrite(&o.expression)?;
        diff |= changed(&o.expression, &ne);
        out.push(OrderExpr::new(o.order_type, ne));
    }
    Ok((out, diff))
}

pub fn rewrite_columns<R: DbRewriter + ?Sized>(
    r: &mut R,
    columns: &[ColumnDeclaration],
) -> TranslateResult<(Vec<ColumnDeclaration>, bool)> {
    let mut diff = false;
    let mut out = Vec::with_capacity(columns.len());
    for c in columns {
        let ne = r.rewrite(&c.expression)?;
        diff |= changed(&c.expression, &ne);
        out.push(ColumnDeclaration { name: c.name.clone(), expression: ne, db_type: c.db_type });
    }
    Ok((out, diff))
}

fn rewrite_assignments<R: DbRewriter + ?Sized>(
    r: &mut R,
    assignments: &[ColumnAssignment],
) -> TranslateResult<(Vec<ColumnAssignment>, bool)> {
    let mut diff = false;
    let mut out = Vec::with_capacity(assignments.len());
    for a in assignments {
        let ne = r.rewrite(&a.value)?;
        diff |= changed(&a.value, &ne);
        out.push(ColumnAssignment { column: a.column.clone(), db_type: a.db_type, value: ne });
    }
    Ok((out, diff))
}

/// Rewrite a projection held by value (inside a client join) through the
/// regular expression dispatch.
pub fn rewrite_projection_value<R: DbRewriter + ?Sized>(
    r: &mut R,
    projection: &ProjectionExpr,
) -> TranslateResult<(ProjectionExpr, bool)> {
    let wrapped = projection.clone().into_expr();
    let rewritten = r.rewrite(&wrapped)?;
    if !changed(&wrapped, &rewritten) {
        return Ok((projection.clone(), false));
    }
    match rewritten.as_ref() {
        DbExpr::Projection(p) => Ok((p.clone(), true)),
        other => Err(TranslateError::invalid(format!("client join projection rewritten into {}", other))),
    }
}

/// Rebuild a select from its rewritten clauses. `from` goes first so passes
/// that track the current source see it before dependent clauses.
pub fn walk_select<R: DbRewriter + ?Sized>(r: &mut R, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
    let (from, d1) = rewrite_opt(r, &select.from)?;
    let (where_clause, d2) = rewrite_opt(r, &select.where_clause)?;
    let (order_by, d3) = rewrite_orders(r, &select.order_by)?;
    let (group_by, d4) = rewrite_list(r, &select.group_by)?;
    let (having, d5) = rewrite_opt(r, &select.having)?;
    let (skip, d6) = rewrite_opt(r, &select.skip)?;
    let (take, d7) = rewrite_opt(r, &select.take)?;
    let (columns, d8) = rewrite_columns(r, &select.columns)?;
    if !(d1 || d2 || d3 || d4 || d5 || d6 || d7 || d8) {
        return Ok(select.clone());
    }
    Ok(Arc::new(SelectExpr {
        alias: select.alias,
        columns,
        from,
        where_clause,
        order_by,
        group_by,
        is_distinct: select.is_distinct,
        skip,
        take,
        having,
        is_reverse: select.is_reverse,
        segment: select.segment,
    }))
}

/// Structural rebuild of any node from its rewritten children.
pub fn walk_children<R: DbRewriter + ?Sized>(r: &mut R, expr: &Expr) -> TranslateResult<Expr> {
    let rebuilt = match expr.as_ref() {
        DbExpr::Literal(_) | DbExpr::Variable(_) | DbExpr::Column(_) | DbExpr::SubqueryColumn(_) | DbExpr::Table(_) => {
            None
        }
        DbExpr::NamedValue(n) => {
            let v = r.rewrite(&n.value)?;
            changed(&n.value, &v).then(|| DbExpr::NamedValue(NamedValue { name: n.name.clone(), value: v, db_type: n.db_type }))
        }
        DbExpr::Binary(b) => {
            let l = r.rewrite(&b.left)?;
            let rt = r.rewrite(&b.right)?;
            (changed(&b.left, &l) || changed(&b.right, &rt)).then(|| DbExpr::Binary(BinaryExpr { op: b.op, left: l, right: rt }))
        }
        DbExpr::Unary(u) => {
            let o = r.rewrite(&u.operand)?;
            changed(&u.operand, &o).then(|| DbExpr::Unary(UnaryExpr { op: u.op, operand: o }))
        }
        DbExpr::Conditional(c) => {
            let t = r.rewrite(&c.test)?;
            let a = r.rewrite(&c.if_true)?;
            let b = r.rewrite(&c.if_false)?;
            (changed(&c.test, &t) || changed(&c.if_true, &a) || changed(&c.if_false, &b))
                .then(|| DbExpr::Conditional(ConditionalExpr { test: t, if_true: a, if_false: b }))
        }
        DbExpr::IsNull(e) => {
            let ne = r.rewrite(e)?;
            changed(e, &ne).then(|| DbExpr::IsNull(ne))
        }
        DbExpr::Between(b) => {
            let a = r.rewrite(&b.arg)?;
            let lo = r.rewrite(&b.lower)?;
            let hi = r.rewrite(&b.upper)?;
            (changed(&b.arg, &a) || changed(&b.lower, &lo) || changed(&b.upper, &hi))
                .then(|| DbExpr::Between(BetweenExpr { arg: a, lower: lo, upper: hi }))
        }
        DbExpr::Function(f) => {
            let (args, d) = rewrite_list(r, &f.args)?;
            d.then(|| DbExpr::Function(FunctionExpr { name: f.name.clone(), args, db_type: f.db_type }))
        }
        DbExpr::RowNumber(orders) => {
            let (o, d) = rewrite_orders(r, orders)?;
            d.then(|| DbExpr::RowNumber(o))
        }
        DbExpr::Aggregate(a) => {
            let (arg, d) = rewrite_opt(r, &a.argument)?;
            d.then(|| DbExpr::Aggregate(AggregateExpr { argument: arg, ..a.clone() }))
        }
        DbExpr::AggregateSubquery(a) => {
            let in_group = r.rewrite(&a.aggregate_in_group_select)?;
            let sub = r.rewrite_select(&a.aggregate_as_subquery)?;
            (changed(&a.aggregate_in_group_select, &in_group) || !Arc::ptr_eq(&sub, &a.aggregate_as_subquery)).then(|| {
                DbExpr::AggregateSubquery(AggregateSubqueryExpr {
                    group_by_alias: a.group_by_alias,
                    aggregate_in_group_select: in_group,
                    aggregate_as_subquery: sub,
                })
            })
        }
        DbExpr::Scalar(s) => {
            let ns = r.rewrite_select(s)?;
            (!Arc::ptr_eq(&ns, s)).then(|| DbExpr::Scalar(ns))
        }
        DbExpr::Exists(s) => {
            let ns = r.rewrite_select(s)?;
            (!Arc::ptr_eq(&ns, s)).then(|| DbExpr::Exists(ns))
        }
        DbExpr::In(i) => {
            let e = r.rewrite(&i.expr)?;
            let (source, d) = match &i.source {
                InSource::Select(s) => {
                    let ns = r.rewrite_select(s)?;
                    let d = !Arc::ptr_eq(&ns, s);
                    (InSource::Select(ns), d)
                }
                InSource::Values(values) => {
                    let (v, d) = rewrite_list(r, values)?;
                    (InSource::Values(v), d)
                }
            };
            (d || changed(&i.expr, &e)).then(|| DbExpr::In(InExpr { expr: e, source }))
        }
        DbExpr::Select(s) => {
            let ns = r.rewrite_select(s)?;
            (!Arc::ptr_eq(&ns, s)).then(|| DbExpr::Select(ns))
        }
        DbExpr::Join(j) => {
            let l = r.rewrite(&j.left)?;
            let rt = r.rewrite(&j.right)?;
            let (c, d) = rewrite_opt(r, &j.condition)?;
            (d || changed(&j.left, &l) || changed(&j.right, &rt))
                .then(|| DbExpr::Join(JoinExpr { join_type: j.join_type, left: l, right: rt, condition: c }))
        }
        DbExpr::Projection(p) => {
            let s = r.rewrite_select(&p.select)?;
            let pr = r.rewrite(&p.projector)?;
            (!Arc::ptr_eq(&s, &p.select) || changed(&p.projector, &pr)).then(|| {
                DbExpr::Projection(ProjectionExpr {
                    select: s,
                    projector: pr,
                    aggregator: p.aggregator,
                    is_no_tracking: p.is_no_tracking,
                })
            })
        }
        DbExpr::ClientJoin(c) => {
            let (outer_key, d1) = rewrite_list(r, &c.outer_key)?;
            let (inner_key, d2) = rewrite_list(r, &c.inner_key)?;
            let (projection, d3) = rewrite_projection_value(r, &c.projection)?;
            (d1 || d2 || d3).then(|| DbExpr::ClientJoin(ClientJoinExpr { projection, outer_key, inner_key }))
        }
        DbExpr::OuterJoined(o) => {
            let t = r.rewrite(&o.test)?;
            let e = r.rewrite(&o.expr)?;
            (changed(&o.test, &t) || changed(&o.expr, &e)).then(|| DbExpr::OuterJoined(OuterJoinedExpr { test: t, expr: e }))
        }
        DbExpr::New(n) => {
            let mut diff = false;
            let mut members = Vec::with_capacity(n.members.len());
            for (name, e) in &n.members {
                let ne = r.rewrite(e)?;
                diff |= changed(e, &ne);
                members.push((name.clone(), ne));
            }
            diff.then(|| DbExpr::New(NewExpr { members }))
        }
        DbExpr::Entity(e) => {
            let init = r.rewrite(&e.init)?;
            changed(&e.init, &init).then(|| {
                DbExpr::Entity(EntityExpr { entity: e.entity.clone(), init, is_no_tracking: e.is_no_tracking })
            })
        }
        DbExpr::Member(m) => {
            let e = r.rewrite(&m.expr)?;
            changed(&m.expr, &e).then(|| DbExpr::Member(MemberExpr { expr: e, member: m.member.clone() }))
        }
        DbExpr::Grouping(g) => {
            let k = r.rewrite(&g.key)?;
            let el = r.rewrite(&g.elements)?;
            (changed(&g.key, &k) || changed(&g.elements, &el)).then(|| DbExpr::Grouping(GroupingExpr { key: k, elements: el }))
        }
        DbExpr::Insert(i) => {
            let (assignments, d) = rewrite_assignments(r, &i.assignments)?;
            d.then(|| DbExpr::Insert(InsertCommand { table: i.table.clone(), assignments }))
        }
        DbExpr::Update(u) => {
            let (w, d1) = rewrite_opt(r, &u.where_clause)?;
            let (assignments, d2) = rewrite_assignments(r, &u.assignments)?;
            (d1 || d2).then(|| DbExpr::Update(UpdateCommand { table: u.table.clone(), where_clause: w, assignments }))
        }
        DbExpr::Delete(dl) => {
            let (w, d) = rewrite_opt(r, &dl.where_clause)?;
            d.then(|| DbExpr::Delete(DeleteCommand { table: dl.table.clone(), where_clause: w }))
        }
        DbExpr::Block(commands) => {
            let (c, d) = rewrite_list(r, commands)?;
            d.then(|| DbExpr::Block(c))
        }
    };
    Ok(rebuilt.map(Arc::new).unwrap_or_else(|| expr.clone()))
}

/// Read-only traversal in the same shape as [`DbRewriter`].
pub trait DbVisitor {
    fn visit(&mut self, expr: &Expr) {
        walk_visit(self, expr)
    }

    fn visit_select(&mut self, select: &SelectExpr) {
        walk_visit_select(self, select)
    }

    fn visit_column(&mut self, _column: &ColumnExpr) {}
}

pub fn walk_visit_select<V: DbVisitor + ?Sized>(v: &mut V, select: &SelectExpr) {
    if let Some(f) = &select.from {
        v.visit(f);
    }
    if let Some(w) = &select.where_clause {
        v.visit(w);
    }
    for o in &select.order_by {
        v.visit(&o.expression);
    }
    for g in &select.group_by {
        v.visit(g);
    }
    for e in [&select.having, &select.skip, &select.take].into_iter().flatten() {
        v.visit(e);
    }
    for c in &select.columns {
        v.visit(&c.expression);
    }
}

pub fn walk_visit<V: DbVisitor + ?Sized>(v: &mut V, expr: &Expr) {
    match expr.as_ref() {
        DbExpr::Column(c) => v.visit_column(c),
        DbExpr::Select(s) | DbExpr::Scalar(s) | DbExpr::Exists(s) => v.visit_select(s),
        DbExpr::Literal(_) | DbExpr::Variable(_) | DbExpr::SubqueryColumn(_) | DbExpr::Table(_) => {}
        DbExpr::NamedValue(n) => v.visit(&n.value),
        DbExpr::Binary(b) => {
            v.visit(&b.left);
            v.visit(&b.right);
        }
        DbExpr::Unary(u) => v.visit(&u.operand),
        DbExpr::Conditional(c) => {
            v.visit(&c.test);
            v.visit(&c.if_true);
            v.visit(&c.if_false);
        }
        DbExpr::IsNull(e) => v.visit(e),
        DbExpr::Between(b) => {
            v.visit(&b.arg);
            v.visit(&b.lower);
            v.visit(&b.upper);
        }
        DbExpr::Function(f) => f.args.iter().for_each(|a| v.visit(a)),
        DbExpr::RowNumber(orders) => orders.iter().for_each(|o| v.visit(&o.expression)),
        DbExpr::Aggregate(a) => {
            if let Some(arg) = &a.argument {
                v.visit(arg);
            }
        }
        DbExpr::AggregateSubquery(a) => {
            v.visit(&a.aggregate_in_group_select);
            v.visit_select(&a.aggregate_as_subquery);
        }
        DbExpr::In(i) => {
            v.visit(&i.expr);
            match &i.source {
                InSource::Select(s) => v.visit_select(s),
                InSource::Values(values) => values.iter().for_each(|e| v.visit(e)),
            }
        }
        DbExpr::Join(j) => {
            v.visit(&j.left);
            v.visit(&j.right);
            if let Some(c) = &j.condition {
                v.visit(c);
            }
        }
        DbExpr::Projection(p) => {
            v.visit_select(&p.select);
            v.visit(&p.projector);
        }
        DbExpr::ClientJoin(c) => {
            c.outer_key.iter().for_each(|k| v.visit(k));
            c.inner_key.iter().for_each(|k| v.visit(k));
            v.visit_select(&c.projection.select);
            v.visit(&c.projection.projector);
        }
        DbExpr::OuterJoined(o) => {
            v.visit(&o.test);
            v.visit(&o.expr);
        }
        DbExpr::New(n) => n.members.iter().for_each(|(_, e)| v.visit(e)),
        DbExpr::Entity(e) => v.visit(&e.init),
        DbExpr::Member(m) => v.visit(&m.expr),
        DbExpr::Grouping(g) => {
            v.visit(&g.key);
            v.visit(&g.elements);
        }
        DbExpr::Insert(i) => i.assignments.iter().for_each(|a| v.visit(&a.value)),
        DbExpr::Update(u) => {
            if let Some(w) = &u.where_clause {
                v.visit(w);
            }
            u.assignments.iter().for_each(|a| v.visit(&a.value));
        }
        DbExpr::Delete(d) => {
            if let Some(w) = &d.where_clause {
                v.visit(w);
            }
        }
        DbExpr::Block(commands) => commands.iter().for_each(|c| v.visit(c)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DbType, Literal, TableAlias, TableExpr};

    struct Identity;
    impl DbRewriter for Identity {}

    struct BumpInts;
    impl DbRewriter for BumpInts {
        fn rewrite(&mut self, expr: &Expr) -> TranslateResult<Expr> {
            match expr.as_ref() {
                DbExpr::Literal(Literal::Int(n)) => Ok(DbExpr::literal(n + 1)),
                _ => walk_expr(self, expr),
            }
        }
    }

    fn sample() -> Expr {
        let t = TableAlias::new();
        let table = Arc::new(DbExpr::Table(TableExpr { alias: t, name: "Orders".into(), entity: "Order".into() }));
        let id = DbExpr::column(t, "ID", DbType::Int);
        let sel = SelectExpr::new(
            TableAlias::new(),
            vec![ColumnDeclaration::new("ID", id.clone())],
            Some(table),
            Some(DbExpr::equal(id, DbExpr::literal(3))),
        );
        DbExpr::select(sel)
    }

    #[test]
    fn identity_rewrite_keeps_pointer() {
        let e = sample();
        let out = Identity.rewrite(&e).unwrap();
        assert!(Arc::ptr_eq(&e, &out));
    }

    #[test]
    fn changed_leaf_rebuilds_spine_only() {
        let e = sample();
        let out = BumpInts.rewrite(&e).unwrap();
        assert!(!Arc::ptr_eq(&e, &out));
        let (before, after) = (e.as_select().unwrap(), out.as_select().unwrap());
        assert!(Arc::ptr_eq(before.from.as_ref().unwrap(), after.from.as_ref().unwrap()));
        assert!(Arc::ptr_eq(&before.columns[0].expression, &after.columns[0].expression));
        assert_eq!(after.alias, before.alias);
    }

    struct CountColumns(usize);
    impl DbVisitor for CountColumns {
        fn visit_column(&mut self, _column: &ColumnExpr) {
            self.0 += 1;
        }
    }

    #[test]
    fn visitor_reaches_every_column() {
        let mut v = CountColumns(0);
        v.visit(&sample());
        assert_eq!(v.0, 2);
    }
}
