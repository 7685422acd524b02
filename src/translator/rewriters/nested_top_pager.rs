use std::sync::Arc;

use crate::{
    ir::{walk_select, BinaryOp, DbExpr, DbRewriter, Expr, OrderExpr, SelectExpr, TableAlias},
    translator::{rewriters::OrderByRewriter, TranslateError, TranslateResult},
};

/// Lowers `skip` + `take` for dialects with only `TOP n`: an inner
/// `TOP skip+take`, a middle `TOP take` in inverted order, and an outer
/// select restoring the original order.
pub struct NestedTopPager;

impl NestedTopPager {
    pub fn rewrite_tree(expr: &Expr) -> TranslateResult<Expr> {
        NestedTopPager.rewrite(expr)
    }

    fn inverted(orders: &[OrderExpr]) -> Vec<OrderExpr> {
        orders.iter().map(|o| OrderExpr::new(o.order_type.inverted(), o.expression.clone())).collect()
    }

    /// Let the order-by pass lift the orderings of the layer below into
    /// `select`, which receives them as the outermost select.
    fn lift_orders(select: Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let lifted = OrderByRewriter::rewrite_tree(&DbExpr::from_select(select))?;
        lifted.as_select().cloned().ok_or_else(|| TranslateError::invalid("paging layer is no longer a select"))
    }
}

impl DbRewriter for NestedTopPager {
    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let select = walk_select(self, select)?;
        let Some(skip) = select.skip.clone() else { return Ok(select) };
        let Some(take) = select.take.clone() else {
            return Err(TranslateError::unsupported("skip without take on a dialect limited to TOP", DbExpr::from_select(select)));
        };
        if !select.has_order_by() {
            return Err(TranslateError::unsupported("skip without an ordering on a dialect limited to TOP", DbExpr::from_select(select)));
        }

        let skip_plus_take = DbExpr::binary(BinaryOp::Add, skip, take.clone());
        let inner = select.with_paging(None, Some(skip_plus_take));
        let middle = inner.add_redundant_select(TableAlias::new()).with_paging(None, Some(take));
        let middle = Self::lift_orders(middle)?;
        let middle = middle.with_order_by(Self::inverted(&middle.order_by));

        let outer = middle.add_redundant_select(TableAlias::new()).with_paging(None, Some(DbExpr::literal(0)));
        let outer = Self::lift_orders(outer)?;
        let outer = outer.with_order_by(Self::inverted(&outer.order_by));
        Ok(outer.with_paging(None, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ColumnDeclaration, DbType, OrderType, TableExpr};

    fn customers(skip: i64, take: Option<i64>, ordered: bool) -> Expr {
        let (t, s) = (TableAlias::new(), TableAlias::new());
        let table = Arc::new(DbExpr::Table(TableExpr { alias: t, name: "Customers".into(), entity: "Customer".into() }));
        let mut select = SelectExpr::new(s, vec![ColumnDeclaration::new("ID", DbExpr::column(t, "ID", DbType::Int))], Some(table), None);
        if ordered {
            select.order_by = vec![OrderExpr::new(OrderType::Ascending, DbExpr::column(t, "ID", DbType::Int))];
        }
        select.skip = Some(DbExpr::literal(skip));
        select.take = take.map(DbExpr::literal);
        DbExpr::select(select)
    }

    #[test]
    fn three_layers_with_inverted_middle() {
        let out = NestedTopPager::rewrite_tree(&customers(10, Some(5), true)).unwrap();
        let outer = out.as_select().unwrap();
        assert!(outer.take.is_none());
        assert_eq!(outer.order_by[0].order_type, OrderType::Ascending);
        let middle = outer.from.as_ref().unwrap().as_select().unwrap();
        assert!(middle.take.is_some());
        assert_eq!(middle.order_by[0].order_type, OrderType::Descending);
        let inner = middle.from.as_ref().unwrap().as_select().unwrap();
        assert!(inner.skip.is_none());
        assert!(matches!(inner.take.as_deref(), Some(DbExpr::Binary(_))));
    }

    #[test]
    fn missing_take_or_order_is_unsupported() {
        assert!(matches!(NestedTopPager::rewrite_tree(&customers(3, None, true)), Err(TranslateError::Unsupported { .. })));
        assert!(matches!(NestedTopPager::rewrite_tree(&customers(3, Some(2), false)), Err(TranslateError::Unsupported { .. })));
    }
}
