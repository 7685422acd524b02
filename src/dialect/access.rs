use crate::dialect::{common_function, SqlSyntax, TakeStyle};

/// Microsoft Access / Jet: TOP only, no window functions, no DISTINCT inside
/// aggregates.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessSyntax;

impl SqlSyntax for AccessSyntax {
    fn name(&self) -> &'static str {
        "access"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name)
    }

    fn supports_distinct_in_aggregates(&self) -> bool {
        false
    }

    fn supports_subquery_in_select_without_from(&self) -> bool {
        false
    }

    fn supports_window_functions(&self) -> bool {
        false
    }

    fn supports_offset(&self) -> bool {
        false
    }

    fn take_style(&self) -> TakeStyle {
        TakeStyle::Top
    }

    fn format_paging(&self, _skip: Option<&str>, _take: Option<&str>) -> String {
        String::new()
    }

    fn concat_operator(&self) -> &'static str {
        "&"
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "-1" } else { "0" }
    }

    fn generated_identity(&self) -> &'static str {
        "@@IDENTITY"
    }

    fn format_function(&self, name: &str, args: &[String]) -> Option<String> {
        let s = match (name, args) {
            ("upper", [a]) => format!("UCASE({})", a),
            ("lower", [a]) => format!("LCASE({})", a),
            ("length", [a]) => format!("LEN({})", a),
            ("substring", [a, start, len]) => format!("MID({}, {} + 1, {})", a, start, len),
            ("now", []) => "NOW()".to_string(),
            ("year", [a]) => format!("YEAR({})", a),
            ("month", [a]) => format!("MONTH({})", a),
            ("day", [a]) => format!("DAY({})", a),
            ("add_days", [a, n]) => format!("DATEADD('d', {}, {})", n, a),
            ("starts_with", [a, b]) => format!("{} LIKE {} & '*'", a, b),
            ("ends_with", [a, b]) => format!("{} LIKE '*' & {}", a, b),
            ("contains", [a, b]) => format!("{} LIKE '*' & {} & '*'", a, b),
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
    fn falls_back_to_nested_top() {
        assert_eq!(AccessSyntax.paging_strategy(), PagingStrategy::NestedTop);
        assert!(!AccessSyntax.supports_distinct_in_aggregates());
        assert_eq!(AccessSyntax.bool_literal(true), "-1");
    }
}
