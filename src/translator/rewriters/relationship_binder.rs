use std::{mem, sync::Arc};

use crate::{
    ir::{
        rewrite_columns, rewrite_list, rewrite_opt, rewrite_orders, walk_visit, Aggregator, DbExpr, DbRewriter, DbVisitor,
        Expr, JoinType, MemberExpr, ProjectionExpr, SelectExpr, TableAlias,
    },
    metadata::MetadataProvider,
    translator::{ColumnProjector, QueryMapping, TranslateResult},
};

/// Expands relationship member accesses left by the binder. Inside a
/// select, a to-one access becomes an `OUTER APPLY` of the related row on
/// that select's source; anywhere else it becomes a nested projection.
pub struct RelationshipBinder<'a> {
    metadata: &'a dyn MetadataProvider,
    no_tracking: bool,
    current_from: Option<Expr>,
}

impl<'a> RelationshipBinder<'a> {
    pub fn bind(metadata: &'a dyn MetadataProvider, no_tracking: bool, expr: &Expr) -> TranslateResult<Expr> {
        RelationshipBinder { metadata, no_tracking, current_from: None }.rewrite(expr)
    }

    /// Rewrite everything but `from`, which to-one accesses may extend
    /// through `current_from` while the clauses are visited.
    fn rewrite_clauses(&mut self, select: &Arc<SelectExpr>, from_changed: bool) -> TranslateResult<Arc<SelectExpr>> {
        let (where_clause, d1) = rewrite_opt(self, &select.where_clause)?;
        let (order_by, d2) = rewrite_orders(self, &select.order_by)?;
        let (group_by, d3) = rewrite_list(self, &select.group_by)?;
        let (having, d4) = rewrite_opt(self, &select.having)?;
        let (skip, d5) = rewrite_opt(self, &select.skip)?;
        let (take, d6) = rewrite_opt(self, &select.take)?;
        let (columns, d7) = rewrite_columns(self, &select.columns)?;
        let from = self.current_from.clone();
        let from_moved = match (&from, &select.from) {
            (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
            (None, None) => false,
            _ => true,
        };
        if !(from_changed || from_moved || d1 || d2 || d3 || d4 || d5 || d6 || d7) {
            return Ok(select.clone());
        }
        Ok(Arc::new(SelectExpr { columns, from, where_clause, order_by, group_by, skip, take, having, ..(**select).clone() }))
    }

    /// A to-one member read in a projector leaves a scalar subquery there.
    /// It is lifted into a select column so the server evaluates it.
    fn project_scalars(select: Arc<SelectExpr>, projector: Expr) -> TranslateResult<(Arc<SelectExpr>, Expr)> {
        if !ScalarFinder::find(&projector) {
            return Ok((select, projector));
        }
        let alias = TableAlias::new();
        let pc = ColumnProjector::project(&projector, alias, &[select.alias])?;
        let wrapped = Arc::new(SelectExpr::new(alias, pc.columns, Some(DbExpr::from_select(select)), None));
        Ok((wrapped, pc.projector))
    }
}

/// Finds a scalar subquery outside of nested projections.
#[derive(Default)]
struct ScalarFinder {
    found: bool,
}

impl ScalarFinder {
    fn find(expr: &Expr) -> bool {
        let mut finder = ScalarFinder::default();
        finder.visit(expr);
        finder.found
    }
}

impl DbVisitor for ScalarFinder {
    fn visit(&mut self, expr: &Expr) {
        match expr.as_ref() {
            DbExpr::Scalar(_) => self.found = true,
            DbExpr::Projection(_) | DbExpr::ClientJoin(_) => {}
            _ => walk_visit(self, expr),
        }
    }
}

impl DbRewriter for RelationshipBinder<'_> {
    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let (from, from_changed) = rewrite_opt(self, &select.from)?;
        let saved = mem::replace(&mut self.current_from, from);
        let result = self.rewrite_clauses(select, from_changed);
        self.current_from = saved;
        result
    }

    fn rewrite_projection(&mut self, expr: &Expr, projection: &ProjectionExpr) -> TranslateResult<Expr> {
        let select = self.rewrite_select(&projection.select)?;
        let saved = self.current_from.take();
        let projector = self.rewrite(&projection.projector);
        self.current_from = saved;
        let projector = projector?;
        if Arc::ptr_eq(&select, &projection.select) && Arc::ptr_eq(&projector, &projection.projector) {
            return Ok(expr.clone());
        }
        let (select, projector) = Self::project_scalars(select, projector)?;
        Ok(ProjectionExpr { select, projector, ..projection.clone() }.into_expr())
    }

    fn rewrite_member(&mut self, expr: &Expr, member: &MemberExpr) -> TranslateResult<Expr> {
        let source = self.rewrite(&member.expr)?;
        let is_relationship = match QueryMapping::entity_name(&source) {
            Some(entity) => QueryMapping::entity_info(self.metadata, entity)?.relationships.contains_key(&member.member),
            None => false,
        };
        if !is_relationship {
            return match source.as_ref() {
                DbExpr::Member(_) if Arc::ptr_eq(&source, &member.expr) => Ok(expr.clone()),
                _ => QueryMapping::bind_member(self.metadata, &source, &member.member),
            };
        }

        let resolved = MemberExpr { expr: source, member: member.member.clone() };
        let (relationship, mut projection) = QueryMapping::relationship_projection(self.metadata, &resolved, self.no_tracking)?;
        if !relationship.is_many() {
            projection.aggregator = Some(Aggregator::SingleOrDefault);
        }
        let projection = match self.rewrite(&projection.into_expr())?.as_ref() {
            DbExpr::Projection(p) => p.clone(),
            _ => return Ok(expr.clone()),
        };
        if let (false, Some(from)) = (relationship.is_many(), self.current_from.clone()) {
            let joined = QueryMapping::add_outer_join_test(&projection);
            self.current_from = Some(DbExpr::join(JoinType::OuterApply, from, DbExpr::from_select(joined.select), None));
            return Ok(joined.projector);
        }
        Ok(projection.into_expr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::DbType,
        metadata::{EntityInfo, MappingDict, Relationship},
    };

    fn dict() -> MappingDict {
        MappingDict::new()
            .with(
                EntityInfo::new("Order", "Orders")
                    .key("ID", DbType::Int)
                    .column("CustomerID", DbType::Int)
                    .relationship(Relationship::one("Customer", "Customer", &["CustomerID"], &["ID"])),
            )
            .with(
                EntityInfo::new("Customer", "Customers")
                    .key("ID", DbType::Int)
                    .column("City", DbType::String)
                    .relationship(Relationship::many("Orders", "Order", &["ID"], &["CustomerID"])),
            )
    }

    fn orders() -> ProjectionExpr {
        let dict = dict();
        let info = QueryMapping::entity_info(&dict, "Order").unwrap();
        QueryMapping::table_projection(&info, false)
    }

    #[test]
    fn to_one_access_in_where_becomes_outer_apply() {
        let dict = dict();
        let source = orders();
        let customer = Arc::new(DbExpr::Member(MemberExpr { expr: source.projector.clone(), member: "Customer".into() }));
        let city = Arc::new(DbExpr::Member(MemberExpr { expr: customer, member: "City".into() }));
        let filtered = QueryMapping::filtered(&source, |_| Ok(DbExpr::equal(city, DbExpr::literal("London")))).unwrap();

        let out = RelationshipBinder::bind(&dict, false, &filtered.into_expr()).unwrap();
        let projection = out.as_projection().unwrap();
        let DbExpr::Join(join) = projection.select.from.as_ref().unwrap().as_ref() else { panic!("join expected") };
        assert_eq!(join.join_type, JoinType::OuterApply);
        let DbExpr::Binary(b) = projection.select.where_clause.as_ref().unwrap().as_ref() else { panic!("binary expected") };
        assert_eq!(b.left.as_column().unwrap().alias, join.right.declared_alias().unwrap());
    }

    #[test]
    fn to_many_access_in_projector_stays_nested() {
        let dict = dict();
        let info = QueryMapping::entity_info(&dict, "Customer").unwrap();
        let source = QueryMapping::table_projection(&info, false);
        let orders = Arc::new(DbExpr::Member(MemberExpr { expr: source.projector.clone(), member: "Orders".into() }));
        let projection = ProjectionExpr::new(source.select.clone(), orders, None).into_expr();

        let out = RelationshipBinder::bind(&dict, false, &projection).unwrap();
        let nested = out.as_projection().unwrap().projector.as_projection().unwrap();
        assert!(nested.aggregator.is_none());
        assert!(nested.select.where_clause.is_some());
    }

    #[test]
    fn to_one_member_in_projector_becomes_a_column() {
        let dict = dict();
        let source = orders();
        let customer = Arc::new(DbExpr::Member(MemberExpr { expr: source.projector.clone(), member: "Customer".into() }));
        let city = Arc::new(DbExpr::Member(MemberExpr { expr: customer, member: "City".into() }));
        let projection = ProjectionExpr::new(source.select.clone(), city, None).into_expr();

        let out = RelationshipBinder::bind(&dict, false, &projection).unwrap();
        let out = out.as_projection().unwrap();
        let column = out.projector.as_column().expect("projector reads a column");
        assert_eq!(column.alias, out.select.alias);
        let declared = out.select.column(&column.name).unwrap();
        assert!(matches!(declared.expression.as_ref(), DbExpr::Scalar(_)));
    }
}
