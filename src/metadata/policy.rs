use std::collections::HashMap;

use crate::query::QueryExpr;

/// Extra row filters applied to every query over an entity.
pub trait PolicySource {
    /// Single-parameter lambdas over the entity row.
    fn predicates_for(&self, entity: &str) -> Vec<QueryExpr>;
}

#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    predicates: HashMap<String, Vec<QueryExpr>>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `predicate`, a lambda built with [`QueryExpr::lambda`].
    pub fn with(mut self, entity: &str, predicate: QueryExpr) -> Self {
        self.predicates.entry(entity.to_string()).or_default().push(predicate);
        self
    }
}

impl PolicySource for PolicyTable {
    fn predicates_for(&self, entity: &str) -> Vec<QueryExpr> {
        self.predicates.get(entity).cloned().unwrap_or_default()
    }
}
