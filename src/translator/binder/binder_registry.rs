use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::{
    ir::Expr,
    query::{Operator, QueryExpr},
    translator::{
        binder::{aggregate_binders::*, command_binders::*, sequence_binders::*, QueryBinder},
        TranslateResult,
    },
};

/// Binds one operator call; the flag tells whether the call is the root of
/// the whole query.
pub type BindFn = for<'a, 'b> fn(&'b mut QueryBinder<'a>, &[QueryExpr], bool) -> TranslateResult<Expr>;

static BINDERS: Lazy<HashMap<Operator, BindFn>> = Lazy::new(|| {
    let entries: [(Operator, BindFn); 33] = [
        (Operator::Where, bind_where),
        (Operator::Select, bind_select),
        (Operator::SelectMany, bind_select_many),
        (Operator::Join, bind_join),
        (Operator::GroupBy, bind_group_by),
        (Operator::OrderBy, bind_order_asc),
        (Operator::OrderByDescending, bind_order_desc),
        (Operator::ThenBy, bind_then_asc),
        (Operator::ThenByDescending, bind_then_desc),
        (Operator::Skip, bind_skip),
        (Operator::Take, bind_take),
        (Operator::Distinct, bind_distinct),
        (Operator::Reverse, bind_reverse),
        (Operator::DefaultIfEmpty, bind_default_if_empty),
        (Operator::Segment, bind_segment),
        (Operator::Count, bind_count),
        (Operator::Sum, bind_sum),
        (Operator::Min, bind_min),
        (Operator::Max, bind_max),
        (Operator::Average, bind_average),
        (Operator::First, bind_first_op),
        (Operator::FirstOrDefault, bind_first_or_default),
        (Operator::Last, bind_last),
        (Operator::LastOrDefault, bind_last_or_default),
        (Operator::Single, bind_single),
        (Operator::SingleOrDefault, bind_single_or_default),
        (Operator::Any, bind_any),
        (Operator::All, bind_all),
        (Operator::Contains, bind_contains),
        (Operator::Insert, bind_insert),
        (Operator::Update, bind_update),
        (Operator::Delete, bind_delete),
        (Operator::Batch, bind_batch),
    ];
    entries.into_iter().collect()
});

/// Binding rule registered for `op`. The table is built once and never
/// mutated afterwards.
pub fn binder_for(op: Operator) -> Option<BindFn> {
    BINDERS.get(&op).copied()
}

/// Operators with a binding rule, in no particular order.
pub fn bound_operators() -> Vec<Operator> {
    BINDERS.keys().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_operator_has_a_binder() {
        assert_eq!(bound_operators().len(), 33);
        assert!(binder_for(Operator::GroupBy).is_some());
        assert!(binder_for(Operator::Batch).is_some());
    }
}
