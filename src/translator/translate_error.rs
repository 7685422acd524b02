use thiserror::Error;

use crate::ir::TableAlias;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslateError {
    #[error("unsupported {construct}: {rendered}")]
    Unsupported { construct: String, rendered: String },
    #[error("unknown aggregate '{0}'")]
    UnknownAggregateKind(String),
    #[error("entity '{entity}' has no primary key defined")]
    NoPrimaryKeyDefined { entity: String },
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),
    #[error("entity '{entity}' has no member '{member}'")]
    UnknownMember { entity: String, member: String },
    // internal invariant violations; these point at a rewrite bug, not user input
    #[error("column '{column}' of {alias} has no mapping")]
    UndefinedReference { alias: TableAlias, column: String },
    #[error("reference to undeclared alias {alias}")]
    DanglingAlias { alias: TableAlias },
    #[error("relationship '{member}' of '{entity}' includes itself")]
    RecursiveInclude { entity: String, member: String },
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl TranslateError {
    pub fn unsupported(construct: impl Into<String>, rendered: impl ToString) -> Self {
        TranslateError::Unsupported { construct: construct.into(), rendered: rendered.to_string() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        TranslateError::InvalidOperation(message.into())
    }
}

pub type TranslateResult<T> = Result<T, TranslateError>;

/// Failure of a whole translation request: the cause plus the rendering of
/// the query being translated.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{source} (while translating {expression})")]
pub struct TranslationError {
    #[source]
    pub source: TranslateError,
    pub expression: String,
}

impl TranslationError {
    pub fn new(source: TranslateError, expression: impl Into<String>) -> Self {
        Self { source, expression: expression.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_and_source_chain() {
        let inner = TranslateError::NoPrimaryKeyDefined { entity: "Tag".into() };
        assert_eq!(inner.to_string(), "entity 'Tag' has no primary key defined");
        let outer = TranslationError::new(inner.clone(), "Tags.Contains(tags)");
        assert!(outer.to_string().contains("while translating Tags.Contains(tags)"));
        assert_eq!(outer.source().map(|s| s.to_string()), Some(inner.to_string()));
    }
}
