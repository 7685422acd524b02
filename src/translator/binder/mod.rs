pub mod aggregate_binders;
pub mod binder_registry;
pub mod command_binders;
pub mod query_binder;
pub mod sequence_binders;

pub use binder_registry::*;
pub use command_binders::GENERATED_IDENTITY;
pub use query_binder::*;
