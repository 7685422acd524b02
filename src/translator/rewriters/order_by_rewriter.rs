use std::{collections::HashSet, sync::Arc};

use crate::{
    ir::{
        rewrite_opt, walk_children, walk_select, AggregateChecker, AliasGatherer, ColumnDeclaration, DbExpr,
        DbRewriter, Expr, JoinExpr, OrderExpr, ProjectionExpr, SelectExpr, TableAlias,
    },
    translator::TranslateResult,
};

/// Moves orderings out of subqueries to the outermost select (or the
/// nearest select with paging that needs them), resolving reversed selects
/// along the way.
pub struct OrderByRewriter {
    gathered: Option<Vec<OrderExpr>>,
    is_outer_most: bool,
}

impl OrderByRewriter {
    pub fn rewrite_tree(expr: &Expr) -> TranslateResult<Expr> {
        OrderByRewriter { gathered: None, is_outer_most: true }.rewrite(expr)
    }

    fn prepend(&mut self, orders: Vec<OrderExpr>) {
        let mut all = orders;
        all.extend(self.gathered.take().unwrap_or_default());
        let mut seen = HashSet::new();
        all.retain(|o| match o.expression.as_column() {
            Some(c) => seen.insert((c.alias, c.name.clone())),
            None => true,
        });
        self.gathered = Some(all);
    }

    fn reverse(&mut self) {
        if let Some(gathered) = &mut self.gathered {
            for o in gathered.iter_mut() {
                o.order_type = o.order_type.inverted();
            }
        }
    }

    /// Re-express orderings over columns of the select aliased `alias`,
    /// declaring new columns where needed. Orderings over aliases the select
    /// does not produce are dropped.
    fn rebind(
        orders: Vec<OrderExpr>,
        alias: TableAlias,
        produced: &[TableAlias],
        mut columns: Vec<ColumnDeclaration>,
    ) -> (Vec<ColumnDeclaration>, Vec<OrderExpr>) {
        let mut rebound = Vec::with_capacity(orders.len());
        for order in orders {
            let column = order.expression.as_column();
            if column.is_some_and(|c| !produced.contains(&c.alias)) {
                continue;
            }
            let existing = columns.iter().find(|d| {
                Arc::ptr_eq(&d.expression, &order.expression)
                    || d.expression
                        .as_column()
                        .zip(column)
                        .is_some_and(|(dc, c)| dc.alias == c.alias && dc.name == c.name)
            });
            let expression = match existing {
                Some(d) => DbExpr::column(alias, d.name.clone(), d.db_type),
                None => {
                    let base = column.map(|c| c.name.clone()).unwrap_or_else(|| format!("c{}", columns.len()));
                    let name = SelectExpr::available_name(&columns, &base);
                    let declaration = ColumnDeclaration::new(name.clone(), order.expression.clone());
                    let reference = DbExpr::column(alias, name, declaration.db_type);
                    columns.push(declaration);
                    reference
                }
            };
            rebound.push(OrderExpr::new(order.order_type, expression));
        }
        (columns, rebound)
    }
}

fn same_orders(a: &[OrderExpr], b: &[OrderExpr]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| x.order_type == y.order_type && Arc::ptr_eq(&x.expression, &y.expression))
}

impl DbRewriter for OrderByRewriter {
    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let save_outer_most = self.is_outer_most;
        self.is_outer_most = false;
        let select = walk_select(self, select)?;

        let has_order_by = select.has_order_by();
        let has_group_by = select.has_group_by();
        let can_have_order_by = save_outer_most || select.take.is_some() || select.skip.is_some();
        let can_receive = can_have_order_by && !has_group_by && !select.is_distinct && !AggregateChecker::has_aggregates(&select);
        if has_order_by {
            self.prepend(select.order_by.clone());
        }
        if select.is_reverse {
            self.reverse();
        }
        let orderings = if can_receive {
            self.gathered.clone().unwrap_or_default()
        } else if can_have_order_by {
            select.order_by.clone()
        } else {
            Vec::new()
        };
        let can_pass_on = !save_outer_most && !has_group_by && !select.is_distinct;
        let mut columns = select.columns.clone();
        if let Some(gathered) = self.gathered.take() {
            if can_pass_on {
                let produced = select.from.as_ref().map(AliasGatherer::declared).unwrap_or_default();
                let (rebound_columns, rebound) = Self::rebind(gathered, select.alias, &produced, columns);
                columns = rebound_columns;
                self.prepend(rebound);
            }
        }
        self.is_outer_most = save_outer_most;

        if same_orders(&orderings, &select.order_by) && columns.len() == select.columns.len() && !select.is_reverse {
            return Ok(select);
        }
        Ok(Arc::new(SelectExpr { columns, order_by: orderings, is_reverse: false, ..(*select).clone() }))
    }

    fn rewrite_subquery(&mut self, expr: &Expr) -> TranslateResult<Expr> {
        let saved = self.gathered.take();
        let result = walk_children(self, expr);
        self.gathered = saved;
        result
    }

    fn rewrite_projection(&mut self, expr: &Expr, projection: &ProjectionExpr) -> TranslateResult<Expr> {
        let save_outer_most = self.is_outer_most;
        let select = self.rewrite_select(&projection.select)?;
        self.is_outer_most = save_outer_most;
        let saved = self.gathered.take();
        let projector = self.rewrite(&projection.projector)?;
        self.gathered = saved;
        if Arc::ptr_eq(&select, &projection.select) && Arc::ptr_eq(&projector, &projection.projector) {
            return Ok(expr.clone());
        }
        Ok(ProjectionExpr { select, projector, ..projection.clone() }.into_expr())
    }

    fn rewrite_join(&mut self, expr: &Expr, join: &JoinExpr) -> TranslateResult<Expr> {
        let left = self.rewrite(&join.left)?;
        let left_orders = self.gathered.take();
        let right = self.rewrite(&join.right)?;
        if let Some(orders) = left_orders {
            self.prepend(orders);
        }
        let (condition, changed) = rewrite_opt(self, &join.condition)?;
        if !changed && Arc::ptr_eq(&left, &join.left) && Arc::ptr_eq(&right, &join.right) {
            return Ok(expr.clone());
        }
        Ok(DbExpr::join(join.join_type, left, right, condition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DbType, OrderType, TableExpr};

    fn table(alias: TableAlias) -> Expr {
        Arc::new(DbExpr::Table(TableExpr { alias, name: "Customers".into(), entity: "Customer".into() }))
    }

    #[test]
    fn inner_ordering_moves_to_outer_select() {
        let (t, s, o) = (TableAlias::new(), TableAlias::new(), TableAlias::new());
        let mut inner = SelectExpr::new(
            s,
            vec![ColumnDeclaration::new("ID", DbExpr::column(t, "ID", DbType::Int))],
            Some(table(t)),
            None,
        );
        inner.order_by = vec![OrderExpr::new(OrderType::Ascending, DbExpr::column(t, "City", DbType::String))];
        let outer = SelectExpr::new(
            o,
            vec![ColumnDeclaration::new("ID", DbExpr::column(s, "ID", DbType::Int))],
            Some(DbExpr::select(inner)),
            None,
        );
        let out = OrderByRewriter::rewrite_tree(&DbExpr::select(outer)).unwrap();
        let s_out = out.as_select().unwrap();
        assert_eq!(s_out.order_by.len(), 1);
        let c = s_out.order_by[0].expression.as_column().unwrap();
        assert_eq!((c.alias, c.name.as_str()), (s, "City"));
        let inner = s_out.from.as_ref().unwrap().as_select().unwrap();
        assert!(inner.order_by.is_empty());
        assert_eq!(inner.columns.len(), 2);
    }

    #[test]
    fn reversed_select_inverts_gathered_orderings() {
        let (t, s) = (TableAlias::new(), TableAlias::new());
        let mut select = SelectExpr::new(
            s,
            vec![ColumnDeclaration::new("ID", DbExpr::column(t, "ID", DbType::Int))],
            Some(table(t)),
            None,
        );
        select.order_by = vec![OrderExpr::new(OrderType::Ascending, DbExpr::column(t, "ID", DbType::Int))];
        select.is_reverse = true;
        select.take = Some(DbExpr::literal(1));
        let out = OrderByRewriter::rewrite_tree(&DbExpr::select(select)).unwrap();
        let s_out = out.as_select().unwrap();
        assert!(!s_out.is_reverse);
        assert_eq!(s_out.order_by[0].order_type, OrderType::Descending);
    }
}
