use std::{collections::HashMap, sync::Arc};

use crate::{
    ir::{walk_select, ColumnExpr, DbExpr, DbRewriter, Expr, SelectExpr, TableAlias},
    translator::{DbComparer, TranslateResult},
};

/// Merges columns of one select that compute the same expression and
/// redirects references of the dropped names to the kept one.
#[derive(Default)]
pub struct RedundantColumnRemover {
    map: HashMap<(TableAlias, String), String>,
}

impl RedundantColumnRemover {
    pub fn remove(expr: &Expr) -> TranslateResult<Expr> {
        Self::default().rewrite(expr)
    }
}

impl DbRewriter for RedundantColumnRemover {
    fn rewrite_column(&mut self, expr: &Expr, column: &ColumnExpr) -> TranslateResult<Expr> {
        match self.map.get(&(column.alias, column.name.clone())) {
            Some(kept) => Ok(DbExpr::column(column.alias, kept.clone(), column.db_type)),
            None => Ok(expr.clone()),
        }
    }

    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let select = walk_select(self, select)?;
        let mut kept: Vec<usize> = Vec::with_capacity(select.columns.len());
        for (i, c) in select.columns.iter().enumerate() {
            let duplicate = kept.iter().map(|&k| &select.columns[k]).find(|k| {
                Arc::ptr_eq(&k.expression, &c.expression) || DbComparer::are_equal(&k.expression, &c.expression)
            });
            match duplicate {
                Some(k) => {
                    self.map.insert((select.alias, c.name.clone()), k.name.clone());
                }
                None => kept.push(i),
            }
        }
        if kept.len() == select.columns.len() {
            return Ok(select);
        }
        Ok(select.with_columns(kept.into_iter().map(|i| select.columns[i].clone()).collect()))
    }
}
