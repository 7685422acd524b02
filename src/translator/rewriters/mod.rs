pub mod aggregate_rewriter;
pub use aggregate_rewriter::*;

pub mod unused_column_remover;
pub use unused_column_remover::*;

pub mod redundant_column_remover;
pub use redundant_column_remover::*;

pub mod redundant_subquery_remover;
pub use redundant_subquery_remover::*;

pub mod redundant_join_remover;
pub use redundant_join_remover::*;

pub mod comparison_rewriter;
pub use comparison_rewriter::*;

pub mod relationship_includer;
pub use relationship_includer::*;

pub mod relationship_binder;
pub use relationship_binder::*;

pub mod policy_injector;
pub use policy_injector::*;

pub mod singleton_projection_rewriter;
pub use singleton_projection_rewriter::*;

pub mod client_joined_projection_rewriter;
pub use client_joined_projection_rewriter::*;

pub mod order_by_rewriter;
pub use order_by_rewriter::*;

pub mod cross_apply_rewriter;
pub use cross_apply_rewriter::*;

pub mod cross_join_rewriter;
pub use cross_join_rewriter::*;

pub mod row_number_pager;
pub use row_number_pager::*;

pub mod nested_top_pager;
pub use nested_top_pager::*;

pub mod cross_join_isolator;
pub use cross_join_isolator::*;
