use std::{collections::HashMap, sync::Arc};

use crate::{
    ir::{walk_children, ColumnExpr, DbExpr, DbRewriter, Expr, JoinExpr, TableAlias},
    translator::{DbComparer, TranslateResult},
};

/// Collapses a join whose right side and condition repeat a join already
/// present further down the left spine.
#[derive(Default)]
pub struct RedundantJoinRemover {
    map: HashMap<TableAlias, TableAlias>,
}

impl RedundantJoinRemover {
    pub fn remove(expr: &Expr) -> TranslateResult<Expr> {
        Self::default().rewrite(expr)
    }

    fn find_similar_right(candidate: &Expr, compare_to: &JoinExpr) -> Option<TableAlias> {
        let DbExpr::Join(join) = candidate.as_ref() else { return None };
        if join.join_type == compare_to.join_type && DbComparer::are_equal(&join.right, &compare_to.right) {
            let (Some(a), Some(b)) = (join.right.declared_alias(), compare_to.right.declared_alias()) else {
                return None;
            };
            let same_condition = match (&join.condition, &compare_to.condition) {
                (None, None) => true,
                (Some(x), Some(y)) => Arc::ptr_eq(x, y) || DbComparer::are_equal_in_scope(x, y, &[(a, b)]),
                _ => false,
            };
            if same_condition {
                return Some(a);
            }
        }
        Self::find_similar_right(&join.left, compare_to).or_else(|| Self::find_similar_right(&join.right, compare_to))
    }
}

impl DbRewriter for RedundantJoinRemover {
    fn rewrite_join(&mut self, expr: &Expr, _join: &JoinExpr) -> TranslateResult<Expr> {
        let result = walk_children(self, expr)?;
        let DbExpr::Join(join) = result.as_ref() else { return Ok(result) };
        if let Some(right_alias) = join.right.declared_alias() {
            if let Some(similar) = Self::find_similar_right(&join.left, join) {
                self.map.insert(right_alias, similar);
                return Ok(join.left.clone());
            }
        }
        Ok(result)
    }

    fn rewrite_column(&mut self, expr: &Expr, column: &ColumnExpr) -> TranslateResult<Expr> {
        match self.map.get(&column.alias) {
            Some(mapped) => Ok(DbExpr::column(*mapped, column.name.clone(), column.db_type)),
            None => Ok(expr.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ColumnDeclaration, DbType, JoinType, SelectExpr, TableExpr};

    fn table(name: &str) -> (TableAlias, Expr) {
        let a = TableAlias::new();
        (a, Arc::new(DbExpr::Table(TableExpr { alias: a, name: name.into(), entity: name.into() })))
    }

    #[test]
    fn repeated_join_is_collapsed() {
        let (c, customers) = table("Customers");
        let (o1, orders1) = table("Orders");
        let (o2, orders2) = table("Orders");
        let cond = |o| Some(DbExpr::equal(DbExpr::column(o, "CustomerID", DbType::Int), DbExpr::column(c, "ID", DbType::Int)));
        let first = DbExpr::join(JoinType::LeftOuter, customers, orders1, cond(o1));
        let second = DbExpr::join(JoinType::LeftOuter, first.clone(), orders2, cond(o2));
        let s = SelectExpr::new(
            TableAlias::new(),
            vec![ColumnDeclaration::new("n", DbExpr::column(o2, "Total", DbType::Int))],
            Some(second),
            None,
        );
        let out = RedundantJoinRemover::remove(&DbExpr::select(s)).unwrap();
        let s = out.as_select().unwrap();
        assert!(Arc::ptr_eq(s.from.as_ref().unwrap(), &first));
        assert_eq!(s.columns[0].expression.as_column().unwrap().alias, o1);
    }
}
