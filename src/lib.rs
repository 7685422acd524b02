pub mod ir;

pub mod metadata;
pub use metadata::{EntityInfo, MappingDict, MetadataProvider, PolicySource, PolicyTable, Relationship};

pub mod dialect;
pub use dialect::{AccessSyntax, FunctionRegistry, SqlSyntax, SqliteSyntax, TSqlSyntax};

pub mod query;
pub use query::{EntityRow, QueryExpr};

pub mod translator;
pub use translator::{
    NestedResult, QueryParameter, TranslateError, TranslateOptions, TranslationError, TranslationResult, Translator,
};
