pub mod db_type;
pub use db_type::*;

pub mod literal;
pub use literal::*;

pub mod table_alias;
pub use table_alias::*;

pub mod db_expr;
pub use db_expr::*;

pub mod db_display;

pub mod db_rewriter;
pub use db_rewriter::*;

pub mod gatherers;
pub use gatherers::*;

pub mod column_mapper;
pub use column_mapper::*;
