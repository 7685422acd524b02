use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

/// Association between two entities through equal key member lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub member: String,
    pub related_entity: String,
    pub cardinality: Cardinality,
    pub this_keys: Vec<String>,
    pub other_keys: Vec<String>,
    /// Loaded eagerly whenever the owning entity is projected.
    pub include: bool,
    /// Inserts and deletes of the owner propagate to the related rows.
    pub cascade: bool,
}

impl Relationship {
    pub fn many(member: &str, related_entity: &str, this_keys: &[&str], other_keys: &[&str]) -> Self {
        Self::build(member, related_entity, Cardinality::Many, this_keys, other_keys)
    }

    pub fn one(member: &str, related_entity: &str, this_keys: &[&str], other_keys: &[&str]) -> Self {
        Self::build(member, related_entity, Cardinality::One, this_keys, other_keys)
    }

    fn build(member: &str, related_entity: &str, cardinality: Cardinality, this_keys: &[&str], other_keys: &[&str]) -> Self {
        Self {
            member: member.to_string(),
            related_entity: related_entity.to_string(),
            cardinality,
            this_keys: this_keys.iter().map(|k| k.to_string()).collect(),
            other_keys: other_keys.iter().map(|k| k.to_string()).collect(),
            include: false,
            cascade: false,
        }
    }

    pub fn included(mut self) -> Self {
        self.include = true;
        self
    }

    pub fn cascading(mut self) -> Self {
        self.cascade = true;
        self
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}
