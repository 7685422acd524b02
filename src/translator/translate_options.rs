use serde::{Deserialize, Serialize};

/// Knobs of one translation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateOptions {
    /// Write columns without their `t0.` qualifier.
    pub hide_table_aliases: bool,
    /// Omit `AS name` on select columns.
    pub hide_column_aliases: bool,
    /// Write every literal into the SQL text instead of a parameter.
    pub inline_literals: bool,
    /// Emit only the text of the root WHERE clause.
    pub where_only: bool,
    pub no_tracking: bool,
    pub allow_client_joins: bool,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            hide_table_aliases: false,
            hide_column_aliases: false,
            inline_literals: false,
            where_only: false,
            no_tracking: false,
            allow_client_joins: true,
        }
    }
}

impl TranslateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Literal SQL without parameters, e.g. for logging or views.
    pub fn inline() -> Self {
        Self { inline_literals: true, ..Self::default() }
    }

    pub fn where_clause() -> Self {
        Self { where_only: true, hide_table_aliases: true, ..Self::default() }
    }

    pub fn read_only() -> Self {
        Self { no_tracking: true, ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_fills_missing_fields_from_default() {
        let o: TranslateOptions = serde_json::from_str(r#"{"inline_literals":true}"#).unwrap();
        assert_eq!(o, TranslateOptions::inline());
        assert!(o.allow_client_joins);
        let back = serde_json::to_value(TranslateOptions::where_clause()).unwrap();
        assert_eq!(back["where_only"], true);
    }
}
