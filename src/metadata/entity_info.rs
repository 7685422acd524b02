use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    ir::DbType,
    metadata::{KeyKind, MemberInfo, Relationship},
};

/// Mapping of one entity type onto a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub name: String,
    pub table: String,
    pub members: IndexMap<String, MemberInfo>,
    pub relationships: IndexMap<String, Relationship>,
    /// Logical delete flag column; rows with a non-zero flag are hidden.
    pub soft_delete: Option<String>,
}

impl EntityInfo {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            members: IndexMap::new(),
            relationships: IndexMap::new(),
            soft_delete: None,
        }
    }

    fn with_member(mut self, member: MemberInfo) -> Self {
        self.members.insert(member.name.clone(), member);
        self
    }

    pub fn key(self, name: &str, ty: DbType) -> Self {
        self.with_member(MemberInfo { key: KeyKind::Primary, ..MemberInfo::new(name, ty) })
    }

    pub fn identity(self, name: &str, ty: DbType) -> Self {
        self.with_member(MemberInfo { key: KeyKind::Identity, ..MemberInfo::new(name, ty) })
    }

    pub fn column(self, name: &str, ty: DbType) -> Self {
        self.with_member(MemberInfo::new(name, ty))
    }

    pub fn nullable_column(self, name: &str, ty: DbType) -> Self {
        self.with_member(MemberInfo { nullable: true, ..MemberInfo::new(name, ty) })
    }

    /// Member stored under a column name that differs from the member name.
    pub fn mapped_column(self, name: &str, column: &str, ty: DbType) -> Self {
        self.with_member(MemberInfo { column: column.to_string(), ..MemberInfo::new(name, ty) })
    }

    pub fn concurrency(self, name: &str, ty: DbType) -> Self {
        self.with_member(MemberInfo { concurrency: true, ..MemberInfo::new(name, ty) })
    }

    pub fn soft_delete(mut self, column: &str) -> Self {
        self.soft_delete = Some(column.to_string());
        self
    }

    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.insert(relationship.member.clone(), relationship);
        self
    }

    pub fn member(&self, name: &str) -> Option<&MemberInfo> {
        self.members.get(name)
    }

    pub fn primary_keys(&self) -> Vec<&MemberInfo> {
        self.members.values().filter(|m| m.is_primary_key()).collect()
    }

    pub fn concurrency_members(&self) -> Vec<&MemberInfo> {
        self.members.values().filter(|m| m.concurrency).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_members_in_order() {
        let e = EntityInfo::new("Order", "Orders")
            .identity("ID", DbType::Int)
            .column("CustomerID", DbType::String)
            .concurrency("Version", DbType::Int)
            .soft_delete("IsDeleted")
            .relationship(Relationship::one("Customer", "Customer", &["CustomerID"], &["CustomerID"]));
        let names: Vec<&str> = e.members.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["ID", "CustomerID", "Version"]);
        assert_eq!(e.primary_keys().len(), 1);
        assert!(e.primary_keys()[0].is_generated());
        assert_eq!(e.concurrency_members()[0].name, "Version");
        assert_eq!(e.soft_delete.as_deref(), Some("IsDeleted"));
    }

    #[test]
    fn serializes_to_json() {
        let e = EntityInfo::new("Tag", "Tags").column("Name", DbType::String);
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["table"], "Tags");
        assert_eq!(json["members"]["Name"]["ty"], "String");
    }
}
