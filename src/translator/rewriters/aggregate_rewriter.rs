use std::{collections::HashMap, sync::Arc};

use crate::{
    ir::{
        walk_expr, walk_select, walk_visit, AggregateSubqueryExpr, ColumnDeclaration, DbExpr, DbRewriter, DbVisitor,
        Expr, SelectExpr, TableAlias,
    },
    translator::TranslateResult,
};

/// Moves aggregates computed over a group's elements into the select that
/// owns the `GROUP BY`, replacing the correlated subquery with a column.
pub struct AggregateRewriter {
    lookup: HashMap<TableAlias, Vec<Expr>>,
    map: HashMap<*const DbExpr, Expr>,
}

impl AggregateRewriter {
    pub fn rewrite_tree(expr: &Expr) -> TranslateResult<Expr> {
        let mut gatherer = AggregateGatherer { found: Vec::new() };
        gatherer.visit(expr);
        if gatherer.found.is_empty() {
            return Ok(expr.clone());
        }
        let mut lookup: HashMap<TableAlias, Vec<Expr>> = HashMap::new();
        for e in gatherer.found {
            if let DbExpr::AggregateSubquery(a) = e.as_ref() {
                lookup.entry(a.group_by_alias).or_default().push(e.clone());
            }
        }
        AggregateRewriter { lookup, map: HashMap::new() }.rewrite(expr)
    }
}

impl DbRewriter for AggregateRewriter {
    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let select = walk_select(self, select)?;
        let Some(aggregates) = self.lookup.get(&select.alias) else {
            return Ok(select);
        };
        let mut columns = select.columns.clone();
        for e in aggregates {
            let DbExpr::AggregateSubquery(a) = e.as_ref() else { continue };
            let name = SelectExpr::available_name(&columns, &format!("agg{}", columns.len()));
            let declaration = ColumnDeclaration::new(name.clone(), a.aggregate_in_group_select.clone());
            self.map.insert(Arc::as_ptr(e), DbExpr::column(a.group_by_alias, name, declaration.db_type));
            columns.push(declaration);
        }
        Ok(select.with_columns(columns))
    }

    fn rewrite_aggregate_subquery(&mut self, expr: &Expr, aggregate: &AggregateSubqueryExpr) -> TranslateResult<Expr> {
        if let Some(mapped) = self.map.get(&Arc::as_ptr(expr)) {
            return Ok(mapped.clone());
        }
        let subquery = Arc::new(DbExpr::Scalar(aggregate.aggregate_as_subquery.clone()));
        walk_expr(self, &subquery)
    }
}

struct AggregateGatherer {
    found: Vec<Expr>,
}

impl DbVisitor for AggregateGatherer {
    fn visit(&mut self, expr: &Expr) {
        if matches!(expr.as_ref(), DbExpr::AggregateSubquery(_)) && !self.found.iter().any(|f| Arc::ptr_eq(f, expr)) {
            self.found.push(expr.clone());
        }
        walk_visit(self, expr)
    }
}
