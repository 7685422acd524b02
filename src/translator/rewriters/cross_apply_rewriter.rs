use crate::{
    ir::{walk_children, AggregateChecker, AliasGatherer, DbExpr, DbRewriter, Expr, JoinExpr, JoinType},
    translator::{ColumnProjector, TranslateResult},
};

/// Turns `CROSS APPLY` / `OUTER APPLY` into plain joins wherever the right
/// side only correlates with the left through its own `WHERE`.
pub struct CrossApplyRewriter;

impl CrossApplyRewriter {
    pub fn rewrite_tree(expr: &Expr) -> TranslateResult<Expr> {
        CrossApplyRewriter.rewrite(expr)
    }
}

impl DbRewriter for CrossApplyRewriter {
    fn rewrite_join(&mut self, expr: &Expr, _join: &JoinExpr) -> TranslateResult<Expr> {
        let rewritten = walk_children(self, expr)?;
        let DbExpr::Join(join) = rewritten.as_ref() else { return Ok(rewritten) };
        if !matches!(join.join_type, JoinType::CrossApply | JoinType::OuterApply) {
            return Ok(rewritten);
        }
        let is_outer = join.join_type == JoinType::OuterApply;

        if let DbExpr::Table(_) = join.right.as_ref() {
            return Ok(if is_outer {
                DbExpr::join(
                    JoinType::LeftOuter,
                    join.left.clone(),
                    join.right.clone(),
                    Some(DbExpr::equal(DbExpr::literal(1), DbExpr::literal(1))),
                )
            } else {
                DbExpr::join(JoinType::CrossJoin, join.left.clone(), join.right.clone(), None)
            });
        }

        let Some(select) = join.right.as_select() else { return Ok(rewritten) };
        if select.take.is_some()
            || select.skip.is_some()
            || select.segment.is_some()
            || select.has_group_by()
            || AggregateChecker::has_aggregates(select)
        {
            return Ok(rewritten);
        }
        let without_where = select.with_where(None);
        let referenced = AliasGatherer::referenced_in_select(&without_where);
        let declared_left = AliasGatherer::declared(&join.left);
        if declared_left.iter().any(|a| referenced.contains(a)) {
            return Ok(rewritten);
        }

        let Some(where_clause) = select.where_clause.clone() else {
            return Ok(if is_outer {
                DbExpr::join(
                    JoinType::LeftOuter,
                    join.left.clone(),
                    DbExpr::from_select(without_where),
                    Some(DbExpr::equal(DbExpr::literal(1), DbExpr::literal(1))),
                )
            } else {
                DbExpr::join(JoinType::CrossJoin, join.left.clone(), DbExpr::from_select(without_where), None)
            });
        };
        let produced = without_where.from.as_ref().map(AliasGatherer::declared).unwrap_or_default();
        let projected = ColumnProjector::project_columns(
            ColumnProjector::must_be_column,
            &where_clause,
            &without_where.columns,
            without_where.alias,
            &produced,
        )?;
        let right = DbExpr::from_select(without_where.with_columns(projected.columns));
        let join_type = if is_outer { JoinType::LeftOuter } else { JoinType::InnerJoin };
        Ok(DbExpr::join(join_type, join.left.clone(), right, Some(projected.projector)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ir::{ColumnDeclaration, DbType, SelectExpr, TableAlias, TableExpr};

    fn table(alias: TableAlias, name: &str) -> Expr {
        Arc::new(DbExpr::Table(TableExpr { alias, name: name.into(), entity: name.into() }))
    }

    #[test]
    fn correlated_where_becomes_join_condition() {
        let (c, o, s) = (TableAlias::new(), TableAlias::new(), TableAlias::new());
        let right = SelectExpr::new(
            s,
            vec![ColumnDeclaration::new("OrderID", DbExpr::column(o, "OrderID", DbType::Int))],
            Some(table(o, "Orders")),
            Some(DbExpr::equal(DbExpr::column(o, "CustomerID", DbType::Int), DbExpr::column(c, "ID", DbType::Int))),
        );
        let apply = DbExpr::join(JoinType::CrossApply, table(c, "Customers"), DbExpr::select(right), None);
        let out = CrossApplyRewriter::rewrite_tree(&apply).unwrap();
        let DbExpr::Join(join) = out.as_ref() else { panic!("join expected") };
        assert_eq!(join.join_type, JoinType::InnerJoin);
        let right = join.right.as_select().unwrap();
        assert!(right.where_clause.is_none());
        assert!(right.column("CustomerID").is_some());
    }

    #[test]
    fn apply_with_take_is_kept() {
        let (c, o, s) = (TableAlias::new(), TableAlias::new(), TableAlias::new());
        let mut right = SelectExpr::new(
            s,
            vec![ColumnDeclaration::new("OrderID", DbExpr::column(o, "OrderID", DbType::Int))],
            Some(table(o, "Orders")),
            Some(DbExpr::equal(DbExpr::column(o, "CustomerID", DbType::Int), DbExpr::column(c, "ID", DbType::Int))),
        );
        right.take = Some(DbExpr::literal(1));
        let apply = DbExpr::join(JoinType::OuterApply, table(c, "Customers"), DbExpr::select(right), None);
        let out = CrossApplyRewriter::rewrite_tree(&apply).unwrap();
        assert!(Arc::ptr_eq(&apply, &out));
    }
}
