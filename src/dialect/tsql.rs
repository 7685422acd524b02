use crate::dialect::{common_function, SqlSyntax, TakeStyle};

/// SQL Server. `legacy()` targets servers without OFFSET/FETCH, which page
/// through ROW_NUMBER instead.
#[derive(Debug, Clone, Copy)]
pub struct TSqlSyntax {
    pub offset_fetch: bool,
}

impl Default for TSqlSyntax {
    fn default() -> Self {
        Self { offset_fetch: true }
    }
}

impl TSqlSyntax {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn legacy() -> Self {
        Self { offset_fetch: false }
    }
}

impl SqlSyntax for TSqlSyntax {
    fn name(&self) -> &'static str {
        "tsql"
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn supports_window_functions(&self) -> bool {
        true
    }

    fn supports_offset(&self) -> bool {
        self.offset_fetch
    }

    fn supports_apply(&self) -> bool {
        true
    }

    fn allows_multiple_commands(&self) -> bool {
        true
    }

    fn take_style(&self) -> TakeStyle {
        TakeStyle::Top
    }

    fn format_paging(&self, skip: Option<&str>, take: Option<&str>) -> String {
        let mut out = format!("OFFSET {} ROWS", skip.unwrap_or("0"));
        if let Some(t) = take {
            out.push_str(&format!(" FETCH NEXT {} ROWS ONLY", t));
        }
        out
    }

    fn offset_requires_order(&self) -> bool {
        true
    }

    fn concat_operator(&self) -> &'static str {
        "+"
    }

    fn generated_identity(&self) -> &'static str {
        "SCOPE_IDENTITY()"
    }

    fn format_function(&self, name: &str, args: &[String]) -> Option<String> {
        let s = match (name, args) {
            ("length", [a]) => format!("LEN({})", a),
            ("trim", [a]) => format!("RTRIM(LTRIM({}))", a),
            ("substring", [a, start, len]) => format!("SUBSTRING({}, {} + 1, {})", a, start, len),
            ("now", []) => "GETDATE()".to_string(),
            ("year", [a]) => format!("DATEPART(year, {})", a),
            ("month", [a]) => format!("DATEPART(month, {})", a),
            ("day", [a]) => format!("DATEPART(day, {})", a),
            ("add_days", [a, n]) => format!("DATEADD(day, {}, {})", n, a),
            _ => return common_function(name, args, self.concat_operator()),
        };
        Some(s)
    }
}
