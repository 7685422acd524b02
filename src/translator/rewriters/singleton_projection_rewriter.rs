use std::{mem, sync::Arc};

use crate::{
    ir::{
        AggregateChecker, ColumnMapper, DbExpr, DbRewriter, Expr, JoinType, ProjectionExpr, SelectExpr,
        TableAlias,
    },
    translator::{ColumnProjector, QueryMapping, TranslateError, TranslateResult},
};

/// Flattens nested single-row projections into an `OUTER APPLY` of the
/// enclosing select, so a to-one value is read in the same statement.
pub struct SingletonProjectionRewriter {
    supports_apply: bool,
    is_top_level: bool,
    current_select: Option<Arc<SelectExpr>>,
}

impl SingletonProjectionRewriter {
    pub fn rewrite_tree(expr: &Expr, supports_apply: bool) -> TranslateResult<Expr> {
        SingletonProjectionRewriter { supports_apply, is_top_level: true, current_select: None }.rewrite(expr)
    }

    fn can_join_on_server(select: &SelectExpr) -> bool {
        !select.is_distinct && !select.has_group_by() && !AggregateChecker::has_aggregates(select)
    }

    /// Without APPLY support the join must later reduce to a plain left
    /// join, which needs a right side free of paging and aggregation.
    fn reduces_to_left_join(select: &SelectExpr) -> bool {
        select.take.is_none()
            && select.skip.is_none()
            && select.segment.is_none()
            && !select.has_group_by()
            && !AggregateChecker::has_aggregates(select)
    }

    fn join_singleton(&mut self, current: Arc<SelectExpr>, projection: &ProjectionExpr) -> TranslateResult<Expr> {
        let new_alias = TableAlias::new();
        let current = current.add_redundant_select(new_alias);
        let source = ColumnMapper::map(&DbExpr::from_select(projection.select.clone()), new_alias, [current.alias])?;
        let source = source.as_select().cloned().ok_or_else(|| TranslateError::invalid("singleton source is no longer a select"))?;
        let joined = QueryMapping::add_outer_join_test(&ProjectionExpr { select: source, ..projection.clone() });
        let pc = ColumnProjector::project_columns(
            ColumnProjector::can_be_column,
            &joined.projector,
            &current.columns,
            current.alias,
            &[new_alias, joined.select.alias],
        )?;
        let left = current.from.clone().ok_or_else(|| TranslateError::invalid("redundant select has no source"))?;
        let from = DbExpr::join(JoinType::OuterApply, left, DbExpr::from_select(joined.select), None);
        self.current_select = Some(Arc::new(SelectExpr::new(current.alias, pc.columns, Some(from), None)));
        self.rewrite(&pc.projector)
    }
}

impl DbRewriter for SingletonProjectionRewriter {
    fn rewrite_projection(&mut self, expr: &Expr, projection: &ProjectionExpr) -> TranslateResult<Expr> {
        if self.is_top_level {
            self.is_top_level = false;
            self.current_select = Some(projection.select.clone());
            let projector = self.rewrite(&projection.projector)?;
            let select = self.current_select.take().unwrap_or_else(|| projection.select.clone());
            if Arc::ptr_eq(&projector, &projection.projector) && Arc::ptr_eq(&select, &projection.select) {
                return Ok(expr.clone());
            }
            return Ok(ProjectionExpr { select, projector, ..projection.clone() }.into_expr());
        }

        if let Some(current) = self.current_select.clone() {
            if projection.is_singleton()
                && Self::can_join_on_server(&current)
                && (self.supports_apply || Self::reduces_to_left_join(&projection.select))
            {
                return self.join_singleton(current, projection);
            }
        }

        // Any other nested projection is a root of its own.
        let saved_top = mem::replace(&mut self.is_top_level, true);
        let saved_select = self.current_select.take();
        let result = self.rewrite_projection(expr, projection);
        self.is_top_level = saved_top;
        self.current_select = saved_select;
        result
    }

    fn rewrite_subquery(&mut self, expr: &Expr) -> TranslateResult<Expr> {
        Ok(expr.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{Aggregator, DbType},
        metadata::{EntityInfo, MappingDict},
    };

    #[test]
    fn singleton_in_projector_becomes_outer_apply() {
        let dict = MappingDict::new()
            .with(EntityInfo::new("Order", "Orders").key("ID", DbType::Int).column("CustomerID", DbType::Int))
            .with(EntityInfo::new("Customer", "Customers").key("ID", DbType::Int).column("City", DbType::String));
        let orders = QueryMapping::table_projection(&QueryMapping::entity_info(&dict, "Order").unwrap(), false);
        let customers = QueryMapping::table_projection(&QueryMapping::entity_info(&dict, "Customer").unwrap(), false);
        let outer_key = QueryMapping::bind_member(&dict, &orders.projector, "CustomerID").unwrap();
        let mut customer = QueryMapping::filtered(&customers, |row| {
            Ok(DbExpr::equal(QueryMapping::bind_member(&dict, row, "ID")?, outer_key))
        })
        .unwrap();
        customer.aggregator = Some(Aggregator::SingleOrDefault);
        let root = ProjectionExpr::new(orders.select.clone(), customer.into_expr(), None).into_expr();

        let out = SingletonProjectionRewriter::rewrite_tree(&root, true).unwrap();
        let projection = out.as_projection().unwrap();
        assert_eq!(projection.select.alias, orders.select.alias);
        let DbExpr::Join(join) = projection.select.from.as_ref().unwrap().as_ref() else { panic!("join expected") };
        assert_eq!(join.join_type, JoinType::OuterApply);
        assert!(matches!(projection.projector.as_ref(), DbExpr::OuterJoined(_)));
    }
}
