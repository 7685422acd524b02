use std::sync::Arc;

use crate::{
    ir::{
        walk_select, BetweenExpr, BinaryOp, ColumnDeclaration, DbExpr, DbRewriter, DbType, Expr, OrderExpr,
        SelectExpr, TableAlias,
    },
    translator::{DbComparer, TranslateError, TranslateResult},
};

const ROW_NUMBER_COLUMN: &str = "_rownum";

/// Lowers `skip` (with or without `take`) to a `ROW_NUMBER()` column
/// filtered in a wrapping select.
pub struct RowNumberPager;

impl RowNumberPager {
    pub fn rewrite_tree(expr: &Expr) -> TranslateResult<Expr> {
        RowNumberPager.rewrite(expr)
    }

    /// Orderings of `select` re-expressed over the columns of `inner`, the
    /// layer `select` was pushed into.
    fn orders_over(select: &SelectExpr, inner: &SelectExpr) -> TranslateResult<Vec<OrderExpr>> {
        select
            .order_by
            .iter()
            .map(|o| {
                let declared = inner
                    .columns
                    .iter()
                    .find(|c| Arc::ptr_eq(&c.expression, &o.expression) || DbComparer::are_equal(&c.expression, &o.expression))
                    .ok_or_else(|| TranslateError::unsupported("ordering outside a distinct or grouped select list", &o.expression))?;
                Ok(OrderExpr::new(o.order_type, DbExpr::column(inner.alias, declared.name.clone(), declared.db_type)))
            })
            .collect()
    }
}

impl DbRewriter for RowNumberPager {
    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let select = walk_select(self, select)?;
        let Some(skip) = select.skip.clone() else { return Ok(select) };
        let take = select.take.clone();

        let mut numbered = select.with_paging(None, None);
        let mut orders = select.order_by.clone();
        if select.is_distinct || select.has_group_by() {
            numbered = numbered.add_redundant_select(TableAlias::new());
            if let Some(inner) = numbered.from.as_ref().and_then(|f| f.as_select()) {
                orders = Self::orders_over(&select, inner)?;
            }
            numbered = numbered.with_order_by(orders.clone());
        }
        let numbered = numbered.add_column(ColumnDeclaration {
            name: ROW_NUMBER_COLUMN.to_string(),
            expression: Arc::new(DbExpr::RowNumber(orders)),
            db_type: DbType::Int,
        });

        let layered = numbered.add_redundant_select(TableAlias::new()).remove_column(ROW_NUMBER_COLUMN);
        let numbered_alias = layered
            .from
            .as_ref()
            .and_then(|f| f.declared_alias())
            .ok_or_else(|| TranslateError::invalid("row number layer lost its source"))?;
        let row_number = DbExpr::column(numbered_alias, ROW_NUMBER_COLUMN, DbType::Int);
        let filter = match take {
            Some(take) => Arc::new(DbExpr::Between(BetweenExpr {
                arg: row_number,
                lower: DbExpr::binary(BinaryOp::Add, skip.clone(), DbExpr::literal(1)),
                upper: DbExpr::binary(BinaryOp::Add, skip, take),
            })),
            None => DbExpr::binary(BinaryOp::GreaterThan, row_number, skip),
        };
        Ok(layered.with_where(DbExpr::and_also(layered.where_clause.clone(), Some(filter))))
    }
}
