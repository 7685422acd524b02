pub mod param_id;
pub use param_id::*;

pub mod operator;
pub use operator::*;

pub mod query_expr;
pub use query_expr::*;

pub mod query_builder;

pub mod query_display;
