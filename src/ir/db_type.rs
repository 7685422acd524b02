use serde::{Deserialize, Serialize};

use crate::ir::Literal;

/// Coarse storage classification of a column, parameter or computed value.
///
/// The dialect decides how each variant is spelled; the translator only needs
/// enough detail to type aggregates, parameters and synthesized columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DbType {
    /// Type could not be inferred (NULL literals, untyped functions)
    #[default]
    Unknown,
    Bool,
    Int,
    Float,
    Decimal,
    String,
    DateTime,
    Guid,
    Binary,
}

impl DbType {
    /// Classify a literal value.
    pub fn of_literal(value: &Literal) -> DbType {
        match value {
            Literal::Null => DbType::Unknown,
            Literal::Bool(_) => DbType::Bool,
            Literal::Int(_) => DbType::Int,
            Literal::Float(_) => DbType::Float,
            Literal::String(_) => DbType::String,
            Literal::DateTime(_) => DbType::DateTime,
            Literal::Guid(_) => DbType::Guid,
            Literal::Bytes(_) => DbType::Binary,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, DbType::Int | DbType::Float | DbType::Decimal)
    }

    /// Promote two types to a common representative for arithmetic results.
    ///
    /// `Int` + `Float` -> `Float`, anything with `Decimal` -> `Decimal`. For
    /// different non-numeric types the left-hand value wins unless it is
    /// `Unknown`.
    pub fn promote(a: DbType, b: DbType) -> DbType {
        use DbType::*;
        if a == b { return a; }
        match (a, b) {
            (Decimal, y) | (y, Decimal) if y.is_numeric() => Decimal,
            (Int, Float) | (Float, Int) => Float,
            (Unknown, y) => y,
            (x, _) => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_numeric_widens() {
        assert_eq!(DbType::promote(DbType::Int, DbType::Float), DbType::Float);
        assert_eq!(DbType::promote(DbType::Decimal, DbType::Int), DbType::Decimal);
        assert_eq!(DbType::promote(DbType::Unknown, DbType::String), DbType::String);
        assert_eq!(DbType::promote(DbType::String, DbType::Int), DbType::String);
    }

    #[test]
    fn literal_classification() {
        assert_eq!(DbType::of_literal(&Literal::Int(3)), DbType::Int);
        assert_eq!(DbType::of_literal(&Literal::Null), DbType::Unknown);
        assert!(DbType::Decimal.is_numeric());
        assert!(!DbType::Guid.is_numeric());
    }
}
