use std::{mem, sync::Arc};

use crate::{
    ir::{walk_children, walk_select, AliasGatherer, DbExpr, DbRewriter, Expr, JoinExpr, JoinType, SelectExpr, TableAlias},
    translator::TranslateResult,
};

/// Pulls conjuncts of the enclosing `WHERE` that relate both sides of a
/// cross join into an inner join condition.
#[derive(Default)]
pub struct CrossJoinRewriter {
    current_where: Option<Expr>,
}

impl CrossJoinRewriter {
    pub fn rewrite_tree(expr: &Expr) -> TranslateResult<Expr> {
        Self::default().rewrite(expr)
    }

    fn can_be_join_condition(expr: &Expr, left: &[TableAlias], right: &[TableAlias]) -> bool {
        let referenced = AliasGatherer::referenced(expr);
        let touches_left = left.iter().any(|a| referenced.contains(a));
        let touches_right = right.iter().any(|a| referenced.contains(a));
        let in_scope = referenced.iter().all(|a| left.contains(a) || right.contains(a));
        touches_left && touches_right && in_scope
    }
}

fn same_where(a: &Option<Expr>, b: &Option<Expr>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

impl DbRewriter for CrossJoinRewriter {
    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let saved = mem::replace(&mut self.current_where, select.where_clause.clone());
        let result = walk_select(self, select);
        let current = mem::replace(&mut self.current_where, saved);
        let result = result?;
        if same_where(&current, &select.where_clause) {
            return Ok(result);
        }
        Ok(result.with_where(current))
    }

    fn rewrite_join(&mut self, expr: &Expr, _join: &JoinExpr) -> TranslateResult<Expr> {
        let rewritten = walk_children(self, expr)?;
        let DbExpr::Join(join) = rewritten.as_ref() else { return Ok(rewritten) };
        if join.join_type != JoinType::CrossJoin {
            return Ok(rewritten);
        }
        let Some(current) = &self.current_where else { return Ok(rewritten) };
        let left = AliasGatherer::declared(&join.left);
        let right = AliasGatherer::declared(&join.right);
        let (good, rest): (Vec<_>, Vec<_>) =
            DbExpr::split_conjuncts(current).into_iter().partition(|e| Self::can_be_join_condition(e, &left, &right));
        if good.is_empty() {
            return Ok(rewritten);
        }
        self.current_where = DbExpr::conjunction(rest);
        Ok(DbExpr::join(JoinType::InnerJoin, join.left.clone(), join.right.clone(), DbExpr::conjunction(good)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ColumnDeclaration, DbType, TableExpr};

    fn table(alias: TableAlias, name: &str) -> Expr {
        Arc::new(DbExpr::Table(TableExpr { alias, name: name.into(), entity: name.into() }))
    }

    #[test]
    fn relating_conjunct_moves_into_join() {
        let (c, o, s) = (TableAlias::new(), TableAlias::new(), TableAlias::new());
        let relates = DbExpr::equal(DbExpr::column(o, "CustomerID", DbType::Int), DbExpr::column(c, "ID", DbType::Int));
        let local = DbExpr::equal(DbExpr::column(c, "City", DbType::String), DbExpr::literal("London"));
        let select = SelectExpr::new(
            s,
            vec![ColumnDeclaration::new("ID", DbExpr::column(c, "ID", DbType::Int))],
            Some(DbExpr::join(JoinType::CrossJoin, table(c, "Customers"), table(o, "Orders"), None)),
            Some(DbExpr::and(relates.clone(), local.clone())),
        );
        let out = CrossJoinRewriter::rewrite_tree(&DbExpr::select(select)).unwrap();
        let s_out = out.as_select().unwrap();
        assert!(Arc::ptr_eq(s_out.where_clause.as_ref().unwrap(), &local));
        let DbExpr::Join(join) = s_out.from.as_ref().unwrap().as_ref() else { panic!("join expected") };
        assert_eq!(join.join_type, JoinType::InnerJoin);
        assert!(Arc::ptr_eq(join.condition.as_ref().unwrap(), &relates));
    }
}
