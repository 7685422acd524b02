use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    ir::{
        rewrite_list, rewrite_opt, rewrite_orders, rewrite_projection_value, walk_children, AggregateExpr,
        AggregateKind, ClientJoinExpr, ColumnDeclaration, ColumnExpr, DbExpr, DbRewriter, Expr, InSource, JoinExpr,
        JoinType, ProjectionExpr, SelectExpr, TableAlias,
    },
    translator::TranslateResult,
};

/// Drops select columns nothing above them reads. Usage is collected
/// top-down, so every select is visited after all of its readers.
#[derive(Default)]
pub struct UnusedColumnRemover {
    used: HashMap<TableAlias, HashSet<String>>,
    retain_all: bool,
}

impl UnusedColumnRemover {
    pub fn remove(expr: &Expr) -> TranslateResult<Expr> {
        Self::default().rewrite(expr)
    }

    fn mark(&mut self, alias: TableAlias, name: &str) {
        self.used.entry(alias).or_default().insert(name.to_string());
    }

    fn is_used(&self, alias: TableAlias, name: &str) -> bool {
        self.used.get(&alias).is_some_and(|names| names.contains(name))
    }

    fn mark_single_column(&mut self, select: &SelectExpr) {
        if let Some(c) = select.columns.first() {
            self.mark(select.alias, &c.name);
        }
    }
}

impl DbRewriter for UnusedColumnRemover {
    fn rewrite_column(&mut self, expr: &Expr, column: &ColumnExpr) -> TranslateResult<Expr> {
        self.mark(column.alias, &column.name);
        Ok(expr.clone())
    }

    fn rewrite_subquery(&mut self, expr: &Expr) -> TranslateResult<Expr> {
        match expr.as_ref() {
            DbExpr::Scalar(s) => self.mark_single_column(s),
            DbExpr::In(i) => {
                if let InSource::Select(s) = &i.source {
                    self.mark_single_column(s);
                }
            }
            _ => {}
        }
        walk_children(self, expr)
    }

    fn rewrite_aggregate(&mut self, expr: &Expr, aggregate: &AggregateExpr) -> TranslateResult<Expr> {
        if aggregate.kind == AggregateKind::Count && aggregate.argument.is_none() {
            self.retain_all = true;
        }
        walk_children(self, expr)
    }

    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let was_retained = self.retain_all;
        self.retain_all = false;
        let mut changed = false;
        let mut columns = Vec::with_capacity(select.columns.len());
        for decl in &select.columns {
            if was_retained || select.is_distinct || self.is_used(select.alias, &decl.name) {
                let e = self.rewrite(&decl.expression)?;
                changed |= !Arc::ptr_eq(&e, &decl.expression);
                columns.push(ColumnDeclaration { name: decl.name.clone(), expression: e, db_type: decl.db_type });
            } else {
                changed = true;
            }
        }
        let (take, d1) = rewrite_opt(self, &select.take)?;
        let (skip, d2) = rewrite_opt(self, &select.skip)?;
        let (group_by, d3) = rewrite_list(self, &select.group_by)?;
        let (order_by, d4) = rewrite_orders(self, &select.order_by)?;
        let (having, d5) = rewrite_opt(self, &select.having)?;
        let (where_clause, d6) = rewrite_opt(self, &select.where_clause)?;
        let (from, d7) = rewrite_opt(self, &select.from)?;
        self.used.remove(&select.alias);
        self.retain_all = was_retained;
        if !(changed || d1 || d2 || d3 || d4 || d5 || d6 || d7) {
            return Ok(select.clone());
        }
        Ok(Arc::new(SelectExpr {
            columns,
            from,
            where_clause,
            order_by,
            group_by,
            skip,
            take,
            having,
            ..(**select).clone()
        }))
    }

    fn rewrite_projection(&mut self, expr: &Expr, projection: &ProjectionExpr) -> TranslateResult<Expr> {
        let projector = self.rewrite(&projection.projector)?;
        let select = self.rewrite_select(&projection.select)?;
        if Arc::ptr_eq(&projector, &projection.projector) && Arc::ptr_eq(&select, &projection.select) {
            return Ok(expr.clone());
        }
        Ok(ProjectionExpr { select, projector, ..projection.clone() }.into_expr())
    }

    fn rewrite_client_join(&mut self, expr: &Expr, join: &ClientJoinExpr) -> TranslateResult<Expr> {
        let (inner_key, d1) = rewrite_list(self, &join.inner_key)?;
        let (outer_key, d2) = rewrite_list(self, &join.outer_key)?;
        let (projection, d3) = rewrite_projection_value(self, &join.projection)?;
        if !(d1 || d2 || d3) {
            return Ok(expr.clone());
        }
        Ok(Arc::new(DbExpr::ClientJoin(ClientJoinExpr { projection, outer_key, inner_key })))
    }

    fn rewrite_join(&mut self, expr: &Expr, join: &JoinExpr) -> TranslateResult<Expr> {
        if join.join_type == JoinType::SingletonLeftOuter {
            let right = self.rewrite(&join.right)?;
            if let Some(alias) = right.declared_alias() {
                if !self.used.contains_key(&alias) {
                    return self.rewrite(&join.left);
                }
            }
        }
        let (condition, d1) = rewrite_opt(self, &join.condition)?;
        let right = self.rewrite(&join.right)?;
        let left = self.rewrite(&join.left)?;
        if !d1 && Arc::ptr_eq(&left, &join.left) && Arc::ptr_eq(&right, &join.right) {
            return Ok(expr.clone());
        }
        Ok(DbExpr::join(join.join_type, left, right, condition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DbType, TableExpr};

    fn table(alias: TableAlias) -> Expr {
        Arc::new(DbExpr::Table(TableExpr { alias, name: "Customers".into(), entity: "Customer".into() }))
    }

    #[test]
    fn unread_columns_are_dropped() {
        let (t, s) = (TableAlias::new(), TableAlias::new());
        let inner = SelectExpr::new(
            s,
            vec![
                ColumnDeclaration::new("ID", DbExpr::column(t, "ID", DbType::Int)),
                ColumnDeclaration::new("City", DbExpr::column(t, "City", DbType::String)),
            ],
            Some(table(t)),
            None,
        );
        let p = ProjectionExpr::new(Arc::new(inner), DbExpr::column(s, "City", DbType::String), None).into_expr();
        let out = UnusedColumnRemover::remove(&p).unwrap();
        let DbExpr::Projection(p) = out.as_ref() else { panic!("projection expected") };
        assert_eq!(p.select.columns.len(), 1);
        assert_eq!(p.select.columns[0].name, "City");
    }

    #[test]
    fn count_star_keeps_source_columns() {
        let (t, s, o) = (TableAlias::new(), TableAlias::new(), TableAlias::new());
        let inner = SelectExpr::new(
            s,
            vec![ColumnDeclaration::new("ID", DbExpr::column(t, "ID", DbType::Int))],
            Some(table(t)),
            None,
        );
        let outer = SelectExpr::new(
            o,
            vec![ColumnDeclaration::new("", DbExpr::aggregate(AggregateKind::Count, None, false))],
            Some(DbExpr::select(inner)),
            None,
        );
        let p = ProjectionExpr::new(Arc::new(outer), DbExpr::column(o, "", DbType::Int), None).into_expr();
        let out = UnusedColumnRemover::remove(&p).unwrap();
        let DbExpr::Projection(p) = out.as_ref() else { panic!("projection expected") };
        let inner = p.select.from.as_ref().unwrap().as_select().unwrap();
        assert_eq!(inner.columns.len(), 1);
    }
}
