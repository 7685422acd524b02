pub mod sql_syntax;
pub use sql_syntax::*;

pub mod tsql;
pub use tsql::*;

pub mod sqlite;
pub use sqlite::*;

pub mod access;
pub use access::*;

pub mod function_registry;
pub use function_registry::*;
