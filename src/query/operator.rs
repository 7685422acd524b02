use std::fmt;

/// Tag identifying a query operator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Where,
    Select,
    SelectMany,
    Join,
    GroupBy,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    Skip,
    Take,
    Distinct,
    Reverse,
    DefaultIfEmpty,
    Count,
    Sum,
    Min,
    Max,
    Average,
    First,
    FirstOrDefault,
    Last,
    LastOrDefault,
    Single,
    SingleOrDefault,
    Any,
    All,
    Contains,
    Segment,
    Insert,
    Update,
    Delete,
    Batch,
}

impl Operator {
    pub fn name(self) -> &'static str {
        match self {
            Operator::Where => "Where",
            Operator::Select => "Select",
            Operator::SelectMany => "SelectMany",
            Operator::Join => "Join",
            Operator::GroupBy => "GroupBy",
            Operator::OrderBy => "OrderBy",
            Operator::OrderByDescending => "OrderByDescending",
            Operator::ThenBy => "ThenBy",
            Operator::ThenByDescending => "ThenByDescending",
            Operator::Skip => "Skip",
            Operator::Take => "Take",
            Operator::Distinct => "Distinct",
            Operator::Reverse => "Reverse",
            Operator::DefaultIfEmpty => "DefaultIfEmpty",
            Operator::Count => "Count",
            Operator::Sum => "Sum",
            Operator::Min => "Min",
            Operator::Max => "Max",
            Operator::Average => "Average",
            Operator::First => "First",
            Operator::FirstOrDefault => "FirstOrDefault",
            Operator::Last => "Last",
            Operator::LastOrDefault => "LastOrDefault",
            Operator::Single => "Single",
            Operator::SingleOrDefault => "SingleOrDefault",
            Operator::Any => "Any",
            Operator::All => "All",
            Operator::Contains => "Contains",
            Operator::Segment => "Segment",
            Operator::Insert => "Insert",
            Operator::Update => "Update",
            Operator::Delete => "Delete",
            Operator::Batch => "Batch",
        }
    }

    pub fn is_aggregate(self) -> bool {
        matches!(self, Operator::Count | Operator::Sum | Operator::Min | Operator::Max | Operator::Average)
    }

    /// Operators that produce a sequence rather than a single value.
    pub fn is_sequence(self) -> bool {
        matches!(
            self,
            Operator::Where
                | Operator::Select
                | Operator::SelectMany
                | Operator::Join
                | Operator::GroupBy
                | Operator::OrderBy
                | Operator::OrderByDescending
                | Operator::ThenBy
                | Operator::ThenByDescending
                | Operator::Skip
                | Operator::Take
                | Operator::Distinct
                | Operator::Reverse
                | Operator::DefaultIfEmpty
                | Operator::Segment
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
