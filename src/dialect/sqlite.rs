use crate::dialect::{common_function, SqlSyntax, TakeStyle};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSyntax;

impl SqlSyntax for SqliteSyntax {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn supports_window_functions(&self) -> bool {
        true
    }

    fn supports_offset(&self) -> bool {
        true
    }

    fn take_style(&self) -> TakeStyle {
        TakeStyle::Limit
    }

    fn format_paging(&self, skip: Option<&str>, take: Option<&str>) -> String {
        match (skip, take) {
            (None, Some(t)) => format!("LIMIT {}", t),
            (Some(s), Some(t)) => format!("LIMIT {} OFFSET {}", t, s),
            (Some(s), None) => format!("LIMIT -1 OFFSET {}", s),
            (None, None) => String::new(),
        }
    }

    fn generated_identity(&self) -> &'static str {
        "last_insert_rowid()"
    }

    fn identity_follows_every_insert(&self) -> bool {
        true
    }

    fn format_function(&self, name: &str, args: &[String]) -> Option<String> {
        let s = match (name, args) {
            ("length", [a]) => format!("LENGTH({})", a),
            ("substring", [a, start, len]) => format!("SUBSTR({}, {} + 1, {})", a, start, len),
            ("now", []) => "DATETIME('now')".to_string(),
            ("year", [a]) => format!("CAST(STRFTIME('%Y', {}) AS INTEGER)", a),
            ("month", [a]) => format!("CAST(STRFTIME('%m', {}) AS INTEGER)", a),
            ("day", [a]) => format!("CAST(STRFTIME('%d', {}) AS INTEGER)", a),
            ("add_days", [a, n]) => format!("DATETIME({}, '+' || {} || ' days')", a, n),
            _ => return common_function(name, args, self.concat_operator()),
        };
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PagingStrategy;

    #[test]
    fn limit_offset_forms() {
        let s = SqliteSyntax;
        assert_eq!(s.paging_strategy(), PagingStrategy::OffsetFetch);
        assert_eq!(s.format_paging(None, Some("3")), "LIMIT 3");
        assert_eq!(s.format_paging(Some("4"), Some("3")), "LIMIT 3 OFFSET 4");
        assert_eq!(s.format_paging(Some("4"), None), "LIMIT -1 OFFSET 4");
    }

    #[test]
    fn starts_with_uses_concat_operator() {
        let args = vec!["t0.\"Name\"".to_string(), "@p0".to_string()];
        assert_eq!(
            SqliteSyntax.format_function("starts_with", &args).as_deref(),
            Some("t0.\"Name\" LIKE @p0 || '%'")
        );
    }
}
