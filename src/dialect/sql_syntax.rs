/// How a dialect expresses skip/take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingStrategy {
    /// Native OFFSET/LIMIT or OFFSET/FETCH clauses.
    OffsetFetch,
    /// Window numbering: ROW_NUMBER() column filtered by BETWEEN.
    RowNumber,
    /// Three nested TOP selects with an inverted middle ordering.
    NestedTop,
}

/// Where a bare take is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeStyle {
    /// `SELECT TOP (n) ...`
    Top,
    /// `... LIMIT n`
    Limit,
}

/// Per-database SQL fragments and capability flags.
pub trait SqlSyntax {
    fn name(&self) -> &'static str;

    fn quote_identifier(&self, name: &str) -> String;

    fn parameter_marker(&self, name: &str) -> String {
        format!("@{}", name)
    }

    fn supports_distinct_in_aggregates(&self) -> bool {
        true
    }

    fn supports_subquery_in_select_without_from(&self) -> bool {
        true
    }

    fn supports_window_functions(&self) -> bool;

    fn supports_offset(&self) -> bool;

    /// CROSS APPLY / OUTER APPLY joins.
    fn supports_apply(&self) -> bool {
        false
    }

    fn allows_multiple_commands(&self) -> bool {
        false
    }

    fn take_style(&self) -> TakeStyle;

    fn paging_strategy(&self) -> PagingStrategy {
        if self.supports_offset() {
            PagingStrategy::OffsetFetch
        } else if self.supports_window_functions() {
            PagingStrategy::RowNumber
        } else {
            PagingStrategy::NestedTop
        }
    }

    /// Trailing paging clause for [`PagingStrategy::OffsetFetch`].
    fn format_paging(&self, skip: Option<&str>, take: Option<&str>) -> String;

    /// Whether an OFFSET clause needs an ORDER BY to be legal.
    fn offset_requires_order(&self) -> bool {
        false
    }

    fn concat_operator(&self) -> &'static str {
        "||"
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    /// Expression yielding the key generated by the last insert.
    fn generated_identity(&self) -> &'static str;

    /// The generated-key expression moves on every insert, not only on
    /// inserts into tables with an identity column.
    fn identity_follows_every_insert(&self) -> bool {
        false
    }

    /// Render a known function over already rendered arguments; `None` when
    /// the dialect has no spelling for it.
    fn format_function(&self, name: &str, args: &[String]) -> Option<String>;
}

/// Renderings shared by most dialects. Returns `None` for unknown names or a
/// wrong argument count.
pub fn common_function(name: &str, args: &[String], concat: &str) -> Option<String> {
    let s = match (name, args) {
        ("upper", [a]) => format!("UPPER({})", a),
        ("lower", [a]) => format!("LOWER({})", a),
        ("trim", [a]) => format!("TRIM({})", a),
        ("abs", [a]) => format!("ABS({})", a),
        ("round", [a]) => format!("ROUND({}, 0)", a),
        ("round", [a, d]) => format!("ROUND({}, {})", a, d),
        ("concat", [_, _, ..]) => format!("({})", args.join(&format!(" {} ", concat))),
        ("starts_with", [a, b]) => format!("{} LIKE {} {} '%'", a, b, concat),
        ("ends_with", [a, b]) => format!("{} LIKE '%' {} {}", a, concat, b),
        ("contains", [a, b]) => format!("{} LIKE '%' {} {} {} '%'", a, concat, b, concat),
        _ => return None,
    };
    Some(s)
}

/// Functions whose rendering is a condition rather than a value.
pub fn is_predicate_function(name: &str) -> bool {
    matches!(name, "starts_with" | "ends_with" | "contains")
}
