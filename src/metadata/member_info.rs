use serde::{Deserialize, Serialize};

use crate::ir::DbType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KeyKind {
    #[default]
    None,
    /// Part of the primary key, supplied by the caller on insert.
    Primary,
    /// Primary key generated by the database on insert.
    Identity,
}

/// One persistent property of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub name: String,
    pub column: String,
    pub ty: DbType,
    pub nullable: bool,
    pub key: KeyKind,
    /// Compared against its original value on update/delete.
    pub concurrency: bool,
}

impl MemberInfo {
    pub fn new(name: impl Into<String>, ty: DbType) -> Self {
        let name = name.into();
        Self { column: name.clone(), name, ty, nullable: false, key: KeyKind::None, concurrency: false }
    }

    pub fn is_primary_key(&self) -> bool {
        self.key != KeyKind::None
    }

    pub fn is_generated(&self) -> bool {
        self.key == KeyKind::Identity
    }
}
