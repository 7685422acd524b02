use indexmap::IndexMap;

use crate::{
    ir::{BinaryOp, Literal, UnaryOp},
    query::{Operator, ParamId},
};

/// One in-memory entity instance handed to a DML operator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityRow {
    pub entity: String,
    pub values: IndexMap<String, Literal>,
    /// Values as loaded, used for optimistic concurrency checks.
    pub original: Option<IndexMap<String, Literal>>,
    /// Related rows per cascading relationship member.
    pub children: IndexMap<String, Vec<EntityRow>>,
}

impl EntityRow {
    pub fn new(entity: &str) -> Self {
        Self { entity: entity.to_string(), ..Default::default() }
    }

    pub fn set(mut self, member: &str, value: impl Into<Literal>) -> Self {
        self.values.insert(member.to_string(), value.into());
        self
    }

    pub fn original(mut self, member: &str, value: impl Into<Literal>) -> Self {
        self.original.get_or_insert_with(IndexMap::new).insert(member.to_string(), value.into());
        self
    }

    pub fn child(mut self, member: &str, row: EntityRow) -> Self {
        self.children.entry(member.to_string()).or_default().push(row);
        self
    }

    pub fn get(&self, member: &str) -> Option<&Literal> {
        self.values.get(member)
    }
}

/// A query as built by the caller: method calls over table sources with
/// lambda arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    Table { entity: String },
    Constant(Literal),
    /// Externally supplied value; always sent as a parameter.
    Variable { name: String, value: Literal },
    ValueList(Vec<Literal>),
    EntityList { entity: String, rows: Vec<EntityRow> },
    Row(EntityRow),
    Param(ParamId),
    Lambda { params: Vec<ParamId>, body: Box<QueryExpr> },
    Member { expr: Box<QueryExpr>, name: String },
    Binary { op: BinaryOp, left: Box<QueryExpr>, right: Box<QueryExpr> },
    Unary { op: UnaryOp, operand: Box<QueryExpr> },
    Conditional { test: Box<QueryExpr>, if_true: Box<QueryExpr>, if_false: Box<QueryExpr> },
    New { members: Vec<(String, QueryExpr)> },
    Call { op: Operator, args: Vec<QueryExpr> },
    /// Scalar function: a dialect built-in or a registered custom function.
    Function { name: String, args: Vec<QueryExpr> },
}

impl QueryExpr {
    pub fn as_lambda(&self) -> Option<(&[ParamId], &QueryExpr)> {
        match self {
            QueryExpr::Lambda { params, body } => Some((params, body)),
            _ => None,
        }
    }

    pub fn is_call(&self, op: Operator) -> bool {
        matches!(self, QueryExpr::Call { op: o, .. } if *o == op)
    }

    /// The first argument of an operator call.
    pub fn call_source(&self) -> Option<&QueryExpr> {
        match self {
            QueryExpr::Call { args, .. } => args.first(),
            _ => None,
        }
    }
}
