use std::{mem, sync::Arc};

use crate::{
    ir::{
        walk_children, AggregateChecker, AliasGatherer, BinaryOp, ClientJoinExpr, ColumnDeclaration, ColumnMapper,
        DbExpr, DbRewriter, Expr, JoinType, ProjectionExpr, QueryDuplicator, SelectExpr, TableAlias,
    },
    translator::{ColumnProjector, DbComparer, QueryMapping, TranslateError, TranslateResult},
};

/// Replaces a nested collection correlated to its parent by an equality
/// key with one uncorrelated query over a copy of the parent, joined back
/// on the client through the key lists.
pub struct ClientJoinedProjectionRewriter {
    is_top_level: bool,
    can_join_on_client: bool,
    current_select: Option<Arc<SelectExpr>>,
}

impl ClientJoinedProjectionRewriter {
    pub fn rewrite_tree(expr: &Expr) -> TranslateResult<Expr> {
        ClientJoinedProjectionRewriter { is_top_level: true, can_join_on_client: true, current_select: None }.rewrite(expr)
    }

    fn can_join(&self, select: &SelectExpr) -> bool {
        self.can_join_on_client && !select.is_distinct && !select.has_group_by() && !AggregateChecker::has_aggregates(select)
    }

    /// Split `predicate` into `outer = inner` column pairs over
    /// `outer_alias`. False when some conjunct that mentions the outer
    /// alias is not such an equality.
    fn equi_join_keys(predicate: &Expr, outer_alias: TableAlias, outer: &mut Vec<Expr>, inner: &mut Vec<Expr>) -> bool {
        let mut had_key = false;
        for part in DbExpr::split_conjuncts(predicate) {
            if !AliasGatherer::referenced(&part).contains(&outer_alias) {
                continue;
            }
            let DbExpr::Binary(b) = part.as_ref() else { return false };
            if b.op != BinaryOp::Equal {
                return false;
            }
            match (b.left.as_column(), b.right.as_column()) {
                (Some(l), Some(_)) if l.alias == outer_alias => {
                    outer.push(b.left.clone());
                    inner.push(b.right.clone());
                }
                (Some(_), Some(r)) if r.alias == outer_alias => {
                    outer.push(b.right.clone());
                    inner.push(b.left.clone());
                }
                _ => return false,
            }
            had_key = true;
        }
        had_key
    }

    /// Column of `columns` (declared by a select aliased `alias`) reading
    /// `expr`, declaring one when missing.
    fn expose(columns: &mut Vec<ColumnDeclaration>, alias: TableAlias, expr: &Expr) -> Expr {
        if let Some(d) = columns.iter().find(|d| DbComparer::are_equal(&d.expression, expr)) {
            return DbExpr::column(alias, d.name.clone(), d.db_type);
        }
        let base = expr.as_column().map(|c| c.name.clone()).unwrap_or_else(|| "key".to_string());
        let name = SelectExpr::available_name(columns, &base);
        let declaration = ColumnDeclaration::new(name.clone(), expr.clone());
        let reference = DbExpr::column(alias, name, declaration.db_type);
        columns.push(declaration);
        reference
    }

    fn client_join(&mut self, outer: &Arc<SelectExpr>, projection: &ProjectionExpr) -> TranslateResult<Option<Expr>> {
        let copy = QueryDuplicator::duplicate(&DbExpr::from_select(outer.clone()))?;
        let new_outer = copy.as_select().cloned().ok_or_else(|| TranslateError::invalid("duplicated select changed kind"))?;
        let inner = ColumnMapper::map(&DbExpr::from_select(projection.select.clone()), new_outer.alias, [outer.alias])?;
        let inner = inner.as_select().cloned().ok_or_else(|| TranslateError::invalid("mapped select changed kind"))?;
        let inner = QueryMapping::add_outer_join_test(&ProjectionExpr { select: inner, ..projection.clone() });

        let (mut outer_keys, mut inner_keys) = (Vec::new(), Vec::new());
        let Some(predicate) = &inner.select.where_clause else { return Ok(None) };
        if !Self::equi_join_keys(predicate, new_outer.alias, &mut outer_keys, &mut inner_keys) {
            return Ok(None);
        }

        let mut inner_columns = inner.select.columns.clone();
        let inner_key_columns: Vec<Expr> =
            inner_keys.iter().map(|k| Self::expose(&mut inner_columns, inner.select.alias, k)).collect();
        let inner_select = inner.select.with_columns(inner_columns);

        let joined_alias = TableAlias::new();
        let pc = ColumnProjector::project_columns(
            ColumnProjector::can_be_column,
            &inner.projector,
            &[],
            joined_alias,
            &[new_outer.alias, inner_select.alias],
        )?;
        let mut joined_columns = pc.columns;
        let inner_key: Vec<Expr> =
            inner_key_columns.iter().map(|k| Self::expose(&mut joined_columns, joined_alias, k)).collect();
        let join = DbExpr::join(JoinType::OuterApply, DbExpr::from_select(new_outer.clone()), DbExpr::from_select(inner_select), None);
        let joined = Arc::new(SelectExpr::new(joined_alias, joined_columns, Some(join), None));

        self.current_select = Some(joined.clone());
        let projector = self.rewrite(&pc.projector)?;
        let outer_key = outer_keys
            .iter()
            .map(|k| ColumnMapper::map(k, outer.alias, [new_outer.alias]))
            .collect::<TranslateResult<Vec<_>>>()?;
        let projection = ProjectionExpr { select: joined, projector, ..projection.clone() };
        Ok(Some(Arc::new(DbExpr::ClientJoin(ClientJoinExpr { projection, outer_key, inner_key }))))
    }
}

impl DbRewriter for ClientJoinedProjectionRewriter {
    fn rewrite_projection(&mut self, expr: &Expr, projection: &ProjectionExpr) -> TranslateResult<Expr> {
        let outer = mem::replace(&mut self.current_select, Some(projection.select.clone()));
        let result = self.rewrite_nested(expr, projection, outer.as_ref());
        self.current_select = outer;
        result
    }

    fn rewrite_subquery(&mut self, expr: &Expr) -> TranslateResult<Expr> {
        Ok(expr.clone())
    }
}

impl ClientJoinedProjectionRewriter {
    fn rewrite_nested(&mut self, expr: &Expr, projection: &ProjectionExpr, outer: Option<&Arc<SelectExpr>>) -> TranslateResult<Expr> {
        if self.is_top_level {
            self.is_top_level = false;
            return walk_children(self, expr);
        }
        let Some(outer) = outer else { return walk_children(self, expr) };
        if !projection.is_singleton() && self.can_join(&projection.select) {
            if let Some(joined) = self.client_join(outer, projection)? {
                return Ok(joined);
            }
            return walk_children(self, expr);
        }
        let saved = mem::replace(&mut self.can_join_on_client, false);
        let result = walk_children(self, expr);
        self.can_join_on_client = saved;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::DbType,
        metadata::{EntityInfo, MappingDict},
    };

    #[test]
    fn correlated_collection_becomes_client_join() {
        let dict = MappingDict::new()
            .with(EntityInfo::new("Customer", "Customers").key("ID", DbType::Int))
            .with(EntityInfo::new("Order", "Orders").key("ID", DbType::Int).column("CustomerID", DbType::Int));
        let customers = QueryMapping::table_projection(&QueryMapping::entity_info(&dict, "Customer").unwrap(), false);
        let orders = QueryMapping::table_projection(&QueryMapping::entity_info(&dict, "Order").unwrap(), false);
        let outer_key = QueryMapping::bind_member(&dict, &customers.projector, "ID").unwrap();
        let nested = QueryMapping::filtered(&orders, |row| {
            Ok(DbExpr::equal(QueryMapping::bind_member(&dict, row, "CustomerID")?, outer_key))
        })
        .unwrap();
        let root = ProjectionExpr::new(customers.select.clone(), nested.into_expr(), None).into_expr();

        let out = ClientJoinedProjectionRewriter::rewrite_tree(&root).unwrap();
        let DbExpr::ClientJoin(join) = out.as_projection().unwrap().projector.as_ref() else { panic!("client join expected") };
        assert_eq!(join.outer_key.len(), 1);
        assert_eq!(join.outer_key[0].as_column().unwrap().alias, customers.select.alias);
        assert_eq!(join.inner_key[0].as_column().unwrap().alias, join.projection.select.alias);
    }
}
