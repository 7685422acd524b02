use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    ir::{
        walk_children, walk_expr, walk_select, AggregateChecker, ColumnExpr, DbExpr, DbRewriter, Expr, ProjectionExpr, SelectExpr,
        TableAlias,
    },
    translator::{TranslateError, TranslateResult},
};

/// Removes selects that only rename their source, then merges filtered
/// child selects into their parents where that keeps the semantics.
pub struct RedundantSubqueryRemover;

impl RedundantSubqueryRemover {
    pub fn remove(expr: &Expr) -> TranslateResult<Expr> {
        let expr = RedundantSelects.rewrite(expr)?;
        SubqueryMerger { is_top_level: true }.rewrite(&expr)
    }

    /// Every column is a plain column under its own name.
    pub fn is_simple_projection(select: &SelectExpr) -> bool {
        select.columns.iter().all(|d| d.expression.as_column().is_some_and(|c| c.name == d.name))
    }

    /// Columns read the source select's columns one-to-one, in order.
    pub fn is_name_map_projection(select: &SelectExpr) -> bool {
        let Some(from) = select.from.as_ref().and_then(|f| f.as_select()) else {
            return false;
        };
        select.columns.len() == from.columns.len()
            && select
                .columns
                .iter()
                .zip(&from.columns)
                .all(|(d, f)| d.expression.as_column().is_some_and(|c| c.name == f.name))
    }

    fn is_redundant(select: &SelectExpr) -> bool {
        (Self::is_simple_projection(select) || Self::is_name_map_projection(select))
            && !select.is_distinct
            && !select.is_reverse
            && select.take.is_none()
            && select.skip.is_none()
            && select.where_clause.is_none()
            && select.having.is_none()
            && select.segment.is_none()
            && select.order_by.is_empty()
            && select.group_by.is_empty()
    }

    /// Redundant selects at the top of a source spine, looking through joins
    /// but not into subqueries.
    fn gather(source: &Expr, out: &mut Vec<Arc<SelectExpr>>) {
        match source.as_ref() {
            DbExpr::Select(s) if Self::is_redundant(s) => out.push(s.clone()),
            DbExpr::Join(j) => {
                Self::gather(&j.left, out);
                Self::gather(&j.right, out);
            }
            _ => {}
        }
    }
}

struct RedundantSelects;

impl DbRewriter for RedundantSelects {
    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let select = walk_select(self, select)?;
        let mut redundant = Vec::new();
        if let Some(from) = &select.from {
            RedundantSubqueryRemover::gather(from, &mut redundant);
        }
        if redundant.is_empty() {
            return Ok(select);
        }
        SubqueryRemover::new(&redundant).rewrite_select(&select)
    }

    fn rewrite_projection(&mut self, expr: &Expr, _projection: &ProjectionExpr) -> TranslateResult<Expr> {
        let result = walk_children(self, expr)?;
        let DbExpr::Projection(p) = result.as_ref() else { return Ok(result) };
        let Some(from) = p.select.from.as_ref().and_then(|f| f.as_select()).cloned() else {
            return Ok(result);
        };
        if !RedundantSubqueryRemover::is_redundant(&p.select) {
            return Ok(result);
        }
        // the projection's own select only renames its source: read the source directly
        let mut remover = SubqueryRemover::new(&[p.select.clone()]);
        let projector = remover.rewrite(&p.projector)?;
        Ok(ProjectionExpr { select: from, projector, ..p.clone() }.into_expr())
    }
}

/// Splices the given selects out of a tree, replacing references to their
/// columns with the expressions they declared.
pub struct SubqueryRemover {
    remove: HashSet<*const SelectExpr>,
    map: HashMap<TableAlias, HashMap<String, Expr>>,
}

impl SubqueryRemover {
    pub fn new(selects: &[Arc<SelectExpr>]) -> Self {
        Self {
            remove: selects.iter().map(Arc::as_ptr).collect(),
            map: selects
                .iter()
                .map(|s| (s.alias, s.columns.iter().map(|c| (c.name.clone(), c.expression.clone())).collect()))
                .collect(),
        }
    }
}

impl DbRewriter for SubqueryRemover {
    fn rewrite(&mut self, expr: &Expr) -> TranslateResult<Expr> {
        match expr.as_ref() {
            DbExpr::Select(s) if self.remove.contains(&Arc::as_ptr(s)) => match &s.from {
                Some(from) => self.rewrite(from),
                None => Err(TranslateError::invalid(format!("removed select {} has no source", s.alias))),
            },
            _ => walk_expr(self, expr),
        }
    }

    fn rewrite_column(&mut self, expr: &Expr, column: &ColumnExpr) -> TranslateResult<Expr> {
        let Some(names) = self.map.get(&column.alias) else {
            return Ok(expr.clone());
        };
        match names.get(&column.name) {
            Some(mapped) => {
                let mapped = mapped.clone();
                self.rewrite(&mapped)
            }
            None => Err(TranslateError::UndefinedReference { alias: column.alias, column: column.name.clone() }),
        }
    }
}

struct SubqueryMerger {
    is_top_level: bool,
}

impl SubqueryMerger {
    fn left_most_select(source: &Expr) -> Option<Arc<SelectExpr>> {
        match source.as_ref() {
            DbExpr::Select(s) => Some(s.clone()),
            DbExpr::Join(j) => Self::left_most_select(&j.left),
            _ => None,
        }
    }

    fn is_column_projection(select: &SelectExpr) -> bool {
        select.columns.iter().all(|c| matches!(c.expression.as_ref(), DbExpr::Column(_) | DbExpr::Literal(_)))
    }

    /// A filter over a grouped select that only renames it can become the
    /// grouped select's HAVING.
    fn can_promote_to_having(select: &SelectExpr, from: &SelectExpr) -> bool {
        from.has_group_by()
            && select.where_clause.is_some()
            && RedundantSubqueryRemover::is_name_map_projection(select)
            && !select.has_order_by()
            && !select.has_group_by()
            && !select.is_distinct
            && !select.is_reverse
            && select.skip.is_none()
            && select.take.is_none()
            && !AggregateChecker::has_aggregates(select)
            && !from.is_distinct
            && !from.is_reverse
            && from.skip.is_none()
            && from.take.is_none()
            && from.segment.is_none()
    }

    fn can_merge_with_from(select: &SelectExpr, is_top_level: bool) -> bool {
        let Some(from) = select.from.as_ref().and_then(Self::left_most_select) else {
            return false;
        };
        if Self::can_promote_to_having(select, &from) {
            return true;
        }
        if !Self::is_column_projection(&from) {
            return false;
        }
        let sel_name_map = RedundantSubqueryRemover::is_name_map_projection(select);
        let sel_order = select.has_order_by();
        let sel_group = select.has_group_by();
        let sel_aggregates = AggregateChecker::has_aggregates(select);
        let sel_join = matches!(select.from.as_deref(), Some(DbExpr::Join(_)));
        let sel_where = select.where_clause.is_some();
        let from_order = from.has_order_by();
        let from_group = from.has_group_by();
        let from_aggregates = AggregateChecker::has_aggregates(&from);

        if from.segment.is_some() {
            return false;
        }
        if sel_order && from_order {
            return false;
        }
        if sel_group && from_group {
            return false;
        }
        if select.is_reverse || from.is_reverse {
            return false;
        }
        if from_order && (sel_group || sel_aggregates || select.is_distinct) {
            return false;
        }
        if from_group || from.having.is_some() {
            return false;
        }
        if from.take.is_some()
            && (select.take.is_some() || select.skip.is_some() || select.is_distinct || sel_aggregates || sel_group || sel_join || sel_where)
        {
            return false;
        }
        if from.skip.is_some()
            && (select.skip.is_some() || select.is_distinct || sel_aggregates || sel_group || sel_join || sel_where)
        {
            return false;
        }
        if from.is_distinct
            && (select.take.is_some()
                || select.skip.is_some()
                || !sel_name_map
                || sel_group
                || sel_aggregates
                || (sel_order && !is_top_level)
                || sel_join)
        {
            return false;
        }
        if from_aggregates
            && (select.take.is_some() || select.skip.is_some() || select.is_distinct || sel_aggregates || sel_group || sel_join)
        {
            return false;
        }
        true
    }

    fn merge(select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let Some(from) = select.from.as_ref().and_then(Self::left_most_select) else {
            return Ok(select.clone());
        };
        let promote = Self::can_promote_to_having(select, &from);
        let merged = SubqueryRemover::new(&[from.clone()]).rewrite_select(select)?;
        let mut out = (*merged).clone();
        if promote {
            out.having = DbExpr::and_also(from.having.clone(), merged.where_clause.clone());
            out.where_clause = from.where_clause.clone();
        } else {
            out.where_clause = DbExpr::and_also(from.where_clause.clone(), merged.where_clause.clone());
            out.having = merged.having.clone().or_else(|| from.having.clone());
        }
        if out.order_by.is_empty() {
            out.order_by = from.order_by.clone();
        }
        if out.group_by.is_empty() {
            out.group_by = from.group_by.clone();
        }
        out.skip = out.skip.or_else(|| from.skip.clone());
        out.take = out.take.or_else(|| from.take.clone());
        out.is_distinct |= from.is_distinct;
        Ok(Arc::new(out))
    }
}

impl DbRewriter for SubqueryMerger {
    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let was_top_level = self.is_top_level;
        self.is_top_level = false;
        let mut select = walk_select(self, select)?;
        while Self::can_merge_with_from(&select, was_top_level) {
            select = Self::merge(&select)?;
        }
        self.is_top_level = was_top_level;
        Ok(select)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{AggregateKind, BinaryOp, ColumnDeclaration, DbType, TableExpr},
        translator::DbComparer,
    };

    fn table(alias: TableAlias) -> Expr {
        Arc::new(DbExpr::Table(TableExpr { alias, name: "Customers".into(), entity: "Customer".into() }))
    }

    fn base(t: TableAlias, s: TableAlias) -> SelectExpr {
        SelectExpr::new(
            s,
            vec![
                ColumnDeclaration::new("ID", DbExpr::column(t, "ID", DbType::Int)),
                ColumnDeclaration::new("City", DbExpr::column(t, "City", DbType::String)),
            ],
            Some(table(t)),
            None,
        )
    }

    fn rename(inner: SelectExpr, alias: TableAlias) -> SelectExpr {
        let columns = inner
            .columns
            .iter()
            .map(|c| ColumnDeclaration::new(c.name.clone(), DbExpr::column(inner.alias, c.name.clone(), c.db_type)))
            .collect();
        SelectExpr::new(alias, columns, Some(DbExpr::select(inner)), None)
    }

    #[test]
    fn rename_layers_are_removed() {
        let (t, s1, s2, s3) = (TableAlias::new(), TableAlias::new(), TableAlias::new(), TableAlias::new());
        let top = rename(rename(base(t, s1), s2), s3);
        let p = ProjectionExpr::new(Arc::new(top), DbExpr::column(s3, "City", DbType::String), None).into_expr();
        let out = RedundantSubqueryRemover::remove(&p).unwrap();
        let DbExpr::Projection(p) = out.as_ref() else { panic!("projection expected") };
        assert!(matches!(p.select.from.as_deref(), Some(DbExpr::Table(_))));
        assert_eq!(p.projector.as_column().unwrap().alias, p.select.alias);
    }

    #[test]
    fn removal_is_idempotent() {
        let (t, s1, s2) = (TableAlias::new(), TableAlias::new(), TableAlias::new());
        let mut outer = rename(base(t, s1), s2);
        outer.where_clause = Some(DbExpr::equal(DbExpr::column(s1, "City", DbType::String), DbExpr::literal("London")));
        let e = DbExpr::select(outer);
        let once = RedundantSubqueryRemover::remove(&e).unwrap();
        let twice = RedundantSubqueryRemover::remove(&once).unwrap();
        assert!(DbComparer::are_equal(&once, &twice));
    }

    #[test]
    fn filter_over_take_is_not_merged() {
        let (t, s1, s2) = (TableAlias::new(), TableAlias::new(), TableAlias::new());
        let mut inner = base(t, s1);
        inner.take = Some(DbExpr::literal(5));
        let mut outer = rename(inner, s2);
        outer.where_clause = Some(DbExpr::equal(DbExpr::column(s1, "ID", DbType::Int), DbExpr::literal(1)));
        let out = RedundantSubqueryRemover::remove(&DbExpr::select(outer)).unwrap();
        let s = out.as_select().unwrap();
        assert!(s.from.as_ref().unwrap().as_select().is_some());
        assert!(s.take.is_none());
    }

    #[test]
    fn filter_over_group_becomes_having() {
        let (t, g, o) = (TableAlias::new(), TableAlias::new(), TableAlias::new());
        let key = DbExpr::column(t, "City", DbType::String);
        let mut group = SelectExpr::new(
            g,
            vec![
                ColumnDeclaration::new("City", key.clone()),
                ColumnDeclaration::new("agg1", DbExpr::aggregate(AggregateKind::Count, None, false)),
            ],
            Some(table(t)),
            None,
        );
        group.group_by = vec![key];
        let mut outer = rename(group, o);
        outer.where_clause =
            Some(DbExpr::binary(BinaryOp::GreaterThan, DbExpr::column(g, "agg1", DbType::Int), DbExpr::literal(2)));
        let out = RedundantSubqueryRemover::remove(&DbExpr::select(outer)).unwrap();
        let s = out.as_select().unwrap();
        assert!(matches!(s.from.as_deref(), Some(DbExpr::Table(_))));
        assert!(s.where_clause.is_none());
        assert!(AggregateChecker::contains_aggregate(s.having.as_ref().unwrap()));
        assert_eq!(s.group_by.len(), 1);
    }

    #[test]
    fn unknown_column_of_removed_select_names_its_alias() {
        let (t, s1, s2) = (TableAlias::new(), TableAlias::new(), TableAlias::new());
        let inner = Arc::new(base(t, s1));
        let outer = SelectExpr::new(
            s2,
            vec![ColumnDeclaration::new("Region", DbExpr::column(s1, "Region", DbType::String))],
            Some(DbExpr::from_select(inner.clone())),
            None,
        );
        let err = SubqueryRemover::new(&[inner]).rewrite(&DbExpr::select(outer)).unwrap_err();
        let TranslateError::UndefinedReference { alias, column } = err else { panic!("undefined reference expected") };
        assert_eq!(alias, s1);
        assert_eq!(column, "Region");
    }
}
