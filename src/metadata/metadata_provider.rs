use std::{collections::HashMap, sync::Arc};

use crate::metadata::EntityInfo;

/// Source of entity mappings consulted during translation.
pub trait MetadataProvider {
    fn entity(&self, name: &str) -> Option<Arc<EntityInfo>>;
}

/// In-memory mapping set.
#[derive(Debug, Clone, Default)]
pub struct MappingDict {
    entities: HashMap<String, Arc<EntityInfo>>,
}

impl MappingDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entity: EntityInfo) -> Self {
        self.add(entity);
        self
    }

    pub fn add(&mut self, entity: EntityInfo) {
        self.entities.insert(entity.name.clone(), Arc::new(entity));
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl MetadataProvider for MappingDict {
    fn entity(&self, name: &str) -> Option<Arc<EntityInfo>> {
        self.entities.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DbType;

    #[test]
    fn lookup_by_entity_name() {
        let dict = MappingDict::new().with(EntityInfo::new("Customer", "Customers").key("ID", DbType::String));
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.entity("Customer").map(|e| e.table.clone()), Some("Customers".to_string()));
        assert!(dict.entity("Customers").is_none());
    }
}
