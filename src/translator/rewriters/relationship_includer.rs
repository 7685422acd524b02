use std::sync::Arc;

use crate::{
    ir::{walk_children, Aggregator, DbExpr, DbRewriter, EntityExpr, Expr, MemberExpr, NewExpr},
    metadata::MetadataProvider,
    translator::{QueryMapping, TranslateError, TranslateResult},
};

/// Adds relationships flagged `include` to every projected entity. The
/// relationships being expanded form the current scope; meeting one of
/// them again is a cycle.
pub struct RelationshipIncluder<'a> {
    metadata: &'a dyn MetadataProvider,
    scope: Vec<(String, String)>,
}

impl<'a> RelationshipIncluder<'a> {
    pub fn include(metadata: &'a dyn MetadataProvider, expr: &Expr) -> TranslateResult<Expr> {
        RelationshipIncluder { metadata, scope: Vec::new() }.rewrite(expr)
    }
}

impl DbRewriter for RelationshipIncluder<'_> {
    fn rewrite_entity(&mut self, expr: &Expr, entity: &EntityExpr) -> TranslateResult<Expr> {
        let info = QueryMapping::entity_info(self.metadata, &entity.entity)?;
        let rewritten = walk_children(self, expr)?;
        let DbExpr::Entity(current) = rewritten.as_ref() else { return Ok(rewritten) };
        let DbExpr::New(init) = current.init.as_ref() else { return Ok(rewritten) };

        let mut members = init.members.clone();
        let mut added = false;
        for relationship in info.relationships.values().filter(|r| r.include) {
            if members.iter().any(|(name, _)| name == &relationship.member) {
                continue;
            }
            let key = (info.name.clone(), relationship.member.clone());
            if self.scope.contains(&key) {
                return Err(TranslateError::RecursiveInclude { entity: key.0, member: key.1 });
            }
            let member = MemberExpr { expr: rewritten.clone(), member: relationship.member.clone() };
            let (_, mut projection) = QueryMapping::relationship_projection(self.metadata, &member, entity.is_no_tracking)?;
            if !relationship.is_many() {
                projection.aggregator = Some(Aggregator::SingleOrDefault);
            }
            self.scope.push(key);
            let included = self.rewrite(&projection.into_expr());
            self.scope.pop();
            members.push((relationship.member.clone(), included?));
            added = true;
        }
        if !added {
            return Ok(rewritten);
        }
        Ok(Arc::new(DbExpr::Entity(EntityExpr {
            entity: current.entity.clone(),
            init: Arc::new(DbExpr::New(NewExpr { members })),
            is_no_tracking: current.is_no_tracking,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::DbType,
        metadata::{EntityInfo, MappingDict, Relationship},
    };

    fn customers(dict: &MappingDict) -> Expr {
        let info = QueryMapping::entity_info(dict, "Customer").unwrap();
        QueryMapping::table_projection(&info, false).into_expr()
    }

    #[test]
    fn included_collection_is_added_to_entity() {
        let dict = MappingDict::new()
            .with(
                EntityInfo::new("Customer", "Customers")
                    .key("ID", DbType::Int)
                    .relationship(Relationship::many("Orders", "Order", &["ID"], &["CustomerID"]).included()),
            )
            .with(EntityInfo::new("Order", "Orders").key("ID", DbType::Int).column("CustomerID", DbType::Int));
        let out = RelationshipIncluder::include(&dict, &customers(&dict)).unwrap();
        let DbExpr::Entity(entity) = out.as_projection().unwrap().projector.as_ref() else { panic!("entity expected") };
        let DbExpr::New(init) = entity.init.as_ref() else { panic!("record expected") };
        let (name, orders) = init.members.last().unwrap();
        assert_eq!(name, "Orders");
        assert!(orders.as_projection().is_some());
    }

    #[test]
    fn include_cycle_is_reported() {
        let dict = MappingDict::new()
            .with(
                EntityInfo::new("Customer", "Customers")
                    .key("ID", DbType::Int)
                    .relationship(Relationship::many("Orders", "Order", &["ID"], &["CustomerID"]).included()),
            )
            .with(
                EntityInfo::new("Order", "Orders")
                    .key("ID", DbType::Int)
                    .column("CustomerID", DbType::Int)
                    .relationship(Relationship::one("Customer", "Customer", &["CustomerID"], &["ID"]).included()),
            );
        let err = RelationshipIncluder::include(&dict, &customers(&dict)).unwrap_err();
        assert!(matches!(err, TranslateError::RecursiveInclude { .. }));
    }
}
