use std::sync::Arc;

use crate::{
    ir::{
        ColumnDeclaration, ConditionalExpr, DbExpr, DbType, EntityExpr, Expr, MemberExpr, ProjectionExpr, SelectExpr,
        TableAlias, TableExpr,
    },
    metadata::{EntityInfo, MetadataProvider, Relationship},
    translator::{ColumnProjector, TranslateError, TranslateResult},
};

/// Shapes shared by the binder and the relationship passes.
pub struct QueryMapping;

impl QueryMapping {
    pub fn entity_info(metadata: &dyn MetadataProvider, entity: &str) -> TranslateResult<Arc<EntityInfo>> {
        metadata.entity(entity).ok_or_else(|| TranslateError::UnknownEntity(entity.to_string()))
    }

    /// `SELECT <every member> FROM <table>` projected back into an entity.
    pub fn table_projection(info: &EntityInfo, no_tracking: bool) -> ProjectionExpr {
        let table_alias = TableAlias::new();
        let select_alias = TableAlias::new();
        let table = TableExpr { alias: table_alias, name: info.table.clone(), entity: info.name.clone() };
        let columns = info
            .members
            .values()
            .map(|m| ColumnDeclaration {
                name: m.name.clone(),
                expression: DbExpr::column(table_alias, m.column.clone(), m.ty),
                db_type: m.ty,
            })
            .collect();
        let select = SelectExpr::new(select_alias, columns, Some(Arc::new(DbExpr::Table(table))), None);
        let projector = Self::entity_over_select(info, select_alias, no_tracking);
        ProjectionExpr { select: Arc::new(select), projector, aggregator: None, is_no_tracking: no_tracking }
    }

    /// Entity whose members read the columns a select declared per member.
    pub fn entity_over_select(info: &EntityInfo, alias: TableAlias, no_tracking: bool) -> Expr {
        let members = info.members.values().map(|m| (m.name.clone(), DbExpr::column(alias, m.name.clone(), m.ty))).collect();
        Arc::new(DbExpr::Entity(EntityExpr {
            entity: info.name.clone(),
            init: DbExpr::new_record(members),
            is_no_tracking: no_tracking,
        }))
    }

    /// Entity whose members read physical table columns directly.
    pub fn entity_over_table(info: &EntityInfo, table: &TableExpr) -> Expr {
        let members = info.members.values().map(|m| (m.name.clone(), table.column(m.column.clone(), m.ty))).collect();
        Arc::new(DbExpr::Entity(EntityExpr { entity: info.name.clone(), init: DbExpr::new_record(members), is_no_tracking: true }))
    }

    /// Declare a constant `Test` column on the select and wrap the projector
    /// so a missing outer-joined row reads as absent rather than all-null.
    pub fn add_outer_join_test(projection: &ProjectionExpr) -> ProjectionExpr {
        let name = projection.select.available_column_name("Test");
        let select = projection.select.add_column(ColumnDeclaration::new(name.clone(), DbExpr::literal(1)));
        let test = DbExpr::column(select.alias, name, DbType::Int);
        ProjectionExpr {
            projector: DbExpr::outer_joined(test, projection.projector.clone()),
            select,
            aggregator: projection.aggregator,
            is_no_tracking: projection.is_no_tracking,
        }
    }

    /// Filter a projection through a new select. `predicate` receives the
    /// source projector and returns the where clause.
    pub fn filtered(
        source: &ProjectionExpr,
        predicate: impl FnOnce(&Expr) -> TranslateResult<Expr>,
    ) -> TranslateResult<ProjectionExpr> {
        let where_clause = predicate(&source.projector)?;
        let alias = TableAlias::new();
        let pc = ColumnProjector::project(&source.projector, alias, &[source.select.alias])?;
        let select = SelectExpr::new(alias, pc.columns, Some(DbExpr::from_select(source.select.clone())), Some(where_clause));
        Ok(ProjectionExpr {
            select: Arc::new(select),
            projector: pc.projector,
            aggregator: source.aggregator,
            is_no_tracking: source.is_no_tracking,
        })
    }

    /// Resolve `source.name` on a bound client shape.
    pub fn bind_member(metadata: &dyn MetadataProvider, source: &Expr, name: &str) -> TranslateResult<Expr> {
        match source.as_ref() {
            DbExpr::New(n) => n
                .members
                .iter()
                .find(|(m, _)| m == name)
                .map(|(_, e)| e.clone())
                .ok_or_else(|| TranslateError::UnknownMember { entity: "new".into(), member: name.to_string() }),
            DbExpr::Entity(e) => {
                if let DbExpr::New(init) = e.init.as_ref() {
                    if let Some((_, m)) = init.members.iter().find(|(m, _)| m == name) {
                        return Ok(m.clone());
                    }
                }
                let info = Self::entity_info(metadata, &e.entity)?;
                if info.relationships.contains_key(name) {
                    Ok(Arc::new(DbExpr::Member(MemberExpr { expr: source.clone(), member: name.to_string() })))
                } else {
                    Err(TranslateError::UnknownMember { entity: e.entity.clone(), member: name.to_string() })
                }
            }
            DbExpr::Grouping(g) if name == "Key" => Ok(g.key.clone()),
            DbExpr::OuterJoined(o) => Self::bind_member(metadata, &o.expr, name),
            DbExpr::Conditional(c) => Ok(Arc::new(DbExpr::Conditional(ConditionalExpr {
                test: c.test.clone(),
                if_true: Self::bind_member(metadata, &c.if_true, name)?,
                if_false: Self::bind_member(metadata, &c.if_false, name)?,
            }))),
            DbExpr::Member(_) => {
                Ok(Arc::new(DbExpr::Member(MemberExpr { expr: source.clone(), member: name.to_string() })))
            }
            DbExpr::Literal(l) if l.is_null() => Ok(source.clone()),
            DbExpr::Projection(p) if p.is_singleton() => {
                let inner = Self::bind_member(metadata, &p.projector, name)?;
                let alias = TableAlias::new();
                let pc = ColumnProjector::project(&inner, alias, &[p.select.alias])?;
                let single_column = pc.columns.len() == 1 && pc.projector.as_column().is_some();
                let select = Arc::new(SelectExpr::new(alias, pc.columns, Some(DbExpr::from_select(p.select.clone())), None));
                if single_column {
                    Ok(Arc::new(DbExpr::Scalar(select)))
                } else {
                    Ok(ProjectionExpr { select, projector: pc.projector, aggregator: p.aggregator, is_no_tracking: p.is_no_tracking }
                        .into_expr())
                }
            }
            _ => Err(TranslateError::unsupported("member access", format!("{}.{}", source, name))),
        }
    }

    /// Entity name of a bound owner, looking through outer-join wrappers.
    pub fn entity_name(owner: &Expr) -> Option<&str> {
        match owner.as_ref() {
            DbExpr::Entity(e) => Some(&e.entity),
            DbExpr::OuterJoined(o) => Self::entity_name(&o.expr),
            _ => None,
        }
    }

    /// Related rows of `member`: the related table filtered by its keys
    /// equal to the owner's keys.
    pub fn relationship_projection(
        metadata: &dyn MetadataProvider,
        member: &MemberExpr,
        no_tracking: bool,
    ) -> TranslateResult<(Relationship, ProjectionExpr)> {
        let owner = Self::entity_name(&member.expr)
            .ok_or_else(|| TranslateError::unsupported("relationship owner", member.expr.to_string()))?;
        let info = Self::entity_info(metadata, owner)?;
        let relationship = info
            .relationships
            .get(&member.member)
            .cloned()
            .ok_or_else(|| TranslateError::UnknownMember { entity: owner.to_string(), member: member.member.clone() })?;
        let related = Self::entity_info(metadata, &relationship.related_entity)?;
        let source = Self::table_projection(&related, no_tracking);
        let projection = Self::filtered(&source, |row| {
            let mut parts = Vec::with_capacity(relationship.this_keys.len());
            for (this_key, other_key) in relationship.this_keys.iter().zip(&relationship.other_keys) {
                let outer = Self::bind_member(metadata, &member.expr, this_key)?;
                let inner = Self::bind_member(metadata, row, other_key)?;
                parts.push(DbExpr::equal(inner, outer));
            }
            DbExpr::conjunction(parts).ok_or_else(|| {
                TranslateError::invalid(format!("relationship {}.{} has no keys", owner, relationship.member))
            })
        })?;
        Ok((relationship, projection))
    }

    /// `(a IS NULL AND b IS NULL) OR a = b` for each pair, ANDed together.
    pub fn nulls_equal(left: &[Expr], right: &[Expr]) -> Option<Expr> {
        DbExpr::conjunction(left.iter().zip(right).map(|(a, b)| {
            DbExpr::or(
                DbExpr::and(DbExpr::is_null_test(a.clone()), DbExpr::is_null_test(b.clone())),
                DbExpr::equal(a.clone(), b.clone()),
            )
        }))
    }

    /// Equality of two bound key values, expanded member-wise for records.
    pub fn keys_equal(left: &Expr, right: &Expr) -> Expr {
        match (left.as_ref(), right.as_ref()) {
            (DbExpr::New(a), DbExpr::New(b)) if a.members.len() == b.members.len() => {
                let parts = a.members.iter().zip(&b.members).map(|((_, x), (_, y))| Self::keys_equal(x, y));
                DbExpr::conjunction(parts).unwrap_or_else(|| DbExpr::literal(true))
            }
            _ => DbExpr::equal(left.clone(), right.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{MappingDict, Relationship},
        translator::TranslateError,
    };

    fn dict() -> MappingDict {
        MappingDict::new().with(
            EntityInfo::new("Customer", "Customers")
                .key("ID", DbType::String)
                .column("City", DbType::String)
                .relationship(Relationship::many("Orders", "Order", &["ID"], &["CustomerID"])),
        )
    }

    #[test]
    fn table_projection_reads_every_member() {
        let d = dict();
        let info = d.entity("Customer").unwrap();
        let p = QueryMapping::table_projection(&info, false);
        assert_eq!(p.select.columns.len(), 2);
        let city = QueryMapping::bind_member(&d, &p.projector, "City").unwrap();
        assert_eq!(city.as_column().unwrap().alias, p.select.alias);
        let orders = QueryMapping::bind_member(&d, &p.projector, "Orders").unwrap();
        assert!(matches!(orders.as_ref(), DbExpr::Member(_)));
        assert!(matches!(
            QueryMapping::bind_member(&d, &p.projector, "Nope"),
            Err(TranslateError::UnknownMember { .. })
        ));
    }

    #[test]
    fn outer_join_test_column_is_added() {
        let d = dict();
        let p = QueryMapping::table_projection(&d.entity("Customer").unwrap(), false);
        let t = QueryMapping::add_outer_join_test(&p);
        assert_eq!(t.select.columns.last().map(|c| c.name.as_str()), Some("Test"));
        assert!(matches!(t.projector.as_ref(), DbExpr::OuterJoined(_)));
    }

    #[test]
    fn relationship_projection_filters_on_keys() {
        let d = dict().with(EntityInfo::new("Order", "Orders").key("ID", DbType::Int).column("CustomerID", DbType::String));
        let p = QueryMapping::table_projection(&d.entity("Customer").unwrap(), false);
        let orders = QueryMapping::bind_member(&d, &p.projector, "Orders").unwrap();
        let DbExpr::Member(m) = orders.as_ref() else { panic!("member expected") };
        let (rel, projection) = QueryMapping::relationship_projection(&d, m, false).unwrap();
        assert!(rel.is_many());
        let w = projection.select.where_clause.clone().unwrap();
        let DbExpr::Binary(b) = w.as_ref() else { panic!("binary expected") };
        assert_eq!(b.right.as_column().unwrap().alias, p.select.alias);
    }

    #[test]
    fn record_keys_compare_memberwise() {
        let a = TableAlias::new();
        let l = DbExpr::new_record(vec![("x".into(), DbExpr::column(a, "x", DbType::Int)), ("y".into(), DbExpr::literal(1))]);
        let r = DbExpr::new_record(vec![("x".into(), DbExpr::literal(2)), ("y".into(), DbExpr::column(a, "y", DbType::Int))]);
        assert_eq!(DbExpr::split_conjuncts(&QueryMapping::keys_equal(&l, &r)).len(), 2);
    }
}
