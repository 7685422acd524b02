pub mod translate_error;
pub use translate_error::*;

pub mod translate_options;
pub use translate_options::*;

pub mod db_comparer;
pub use db_comparer::*;

pub mod column_projector;
pub use column_projector::*;

pub mod query_mapping;
pub use query_mapping::*;

pub mod binder;
pub use binder::*;

pub mod rewriters;

pub mod pipeline;
pub use pipeline::*;

pub mod parameterizer;
pub use parameterizer::*;

pub mod sql_formatter;
pub use sql_formatter::*;

pub mod translate;
pub use translate::*;

#[cfg(test)]
mod _tests;
