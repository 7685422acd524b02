use chrono::NaiveDateTime;
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use uuid::Uuid;

/// A constant value carried by the IR, by query parameters and by the
/// front-end operator chain.
///
/// Hashable so the parameterizer can de-duplicate by `(type, value)`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(NotNan<f64>),
    String(String),
    DateTime(NaiveDateTime),
    Guid(Uuid),
    Bytes(Vec<u8>),
}

impl Literal {
    /// Float literal; NaN collapses to NULL since it has no SQL spelling.
    pub fn float(value: f64) -> Literal {
        NotNan::new(value).map(Literal::Float).unwrap_or(Literal::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// Numbers and booleans are written inline by the formatter; everything
    /// else becomes a named parameter.
    pub fn is_inline(&self) -> bool {
        matches!(self, Literal::Null | Literal::Bool(_) | Literal::Int(_) | Literal::Float(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            Literal::Float(f) if f.fract() == 0.0 => Some(f.into_inner() as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(i) => Some(*i as f64),
            Literal::Float(f) => Some(f.into_inner()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self { Literal::Int(value) }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self { Literal::Int(value as i64) }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self { Literal::float(value) }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self { Literal::Bool(value) }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self { Literal::String(value.to_string()) }
}

impl From<String> for Literal {
    fn from(value: String) -> Self { Literal::String(value) }
}

impl From<NaiveDateTime> for Literal {
    fn from(value: NaiveDateTime) -> Self { Literal::DateTime(value) }
}

impl From<Uuid> for Literal {
    fn from(value: Uuid) -> Self { Literal::Guid(value) }
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(n) => write!(f, "{}", n.into_inner()),
            Literal::String(s) => write!(f, "\"{}\"", s),
            Literal::DateTime(d) => write!(f, "#{}#", d.format("%Y-%m-%d %H:%M:%S")),
            Literal::Guid(g) => write!(f, "{{{}}}", g),
            Literal::Bytes(b) => write!(f, "0x{}", b.iter().map(|x| format!("{:02x}", x)).collect::<String>()),
        }
    }
}

impl fmt::Debug for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "Null"),
            Literal::Bool(_) => write!(f, "Bool({})", self),
            Literal::Int(_) => write!(f, "Int({})", self),
            Literal::Float(_) => write!(f, "Float({})", self),
            Literal::String(_) => write!(f, "String({})", self),
            Literal::DateTime(_) => write!(f, "DateTime({})", self),
            Literal::Guid(_) => write!(f, "Guid({})", self),
            Literal::Bytes(_) => write!(f, "Bytes({})", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_becomes_null() {
        assert_eq!(Literal::float(f64::NAN), Literal::Null);
        assert_eq!(Literal::float(1.5).as_f64(), Some(1.5));
    }

    #[test]
    fn inline_only_for_numbers_and_booleans() {
        assert!(Literal::Int(1).is_inline());
        assert!(Literal::Bool(true).is_inline());
        assert!(!Literal::from("abc").is_inline());
        assert!(!Literal::Guid(Uuid::nil()).is_inline());
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(Literal::from("x").to_string(), "\"x\"");
        assert_eq!(Literal::Bytes(vec![1, 255]).to_string(), "0x01ff");
        assert_eq!(format!("{:?}", Literal::Int(4)), "Int(4)");
    }
}
