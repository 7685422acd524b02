use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ir::{DbType, Literal, TableAlias};

/// Shared handle to an immutable IR node. Rewrites build new nodes and reuse
/// unchanged children, so `Arc::ptr_eq` is a valid "nothing changed" test.
pub type Expr = Arc<DbExpr>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Concat,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
    Like,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanOrEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanOrEqual
                | BinaryOp::Like
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Concat => "||",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "<>",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Like => "LIKE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
    Ascending,
    Descending,
}

impl OrderType {
    pub fn inverted(self) -> OrderType {
        match self {
            OrderType::Ascending => OrderType::Descending,
            OrderType::Descending => OrderType::Ascending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderExpr {
    pub order_type: OrderType,
    pub expression: Expr,
}

impl OrderExpr {
    pub fn new(order_type: OrderType, expression: Expr) -> Self {
        Self { order_type, expression }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    CrossJoin,
    InnerJoin,
    LeftOuter,
    RightOuter,
    CrossApply,
    OuterApply,
    SingletonLeftOuter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Count,
    Min,
    Max,
    Sum,
    Average,
}

impl AggregateKind {
    pub fn from_name(name: &str) -> Option<AggregateKind> {
        match name.to_ascii_lowercase().as_str() {
            "count" | "longcount" => Some(AggregateKind::Count),
            "min" => Some(AggregateKind::Min),
            "max" => Some(AggregateKind::Max),
            "sum" => Some(AggregateKind::Sum),
            "avg" | "average" => Some(AggregateKind::Average),
            _ => None,
        }
    }

    pub fn sql_name(self) -> &'static str {
        match self {
            AggregateKind::Count => "COUNT",
            AggregateKind::Min => "MIN",
            AggregateKind::Max => "MAX",
            AggregateKind::Sum => "SUM",
            AggregateKind::Average => "AVG",
        }
    }

    /// Count takes a predicate rather than a selector as its optional argument.
    pub fn has_predicate_arg(self) -> bool {
        matches!(self, AggregateKind::Count)
    }
}

/// Post-processing applied by the materializer to the rows of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregator {
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    /// Exactly one row holding one value (root aggregates, root Any/All).
    Scalar,
}

/// A logical paging request handed back to the caller instead of being
/// embedded in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PagingSpec {
    pub page: i64,
    pub size: i64,
}

#[derive(Debug, Clone)]
pub struct ColumnDeclaration {
    pub name: String,
    pub expression: Expr,
    pub db_type: DbType,
}

impl ColumnDeclaration {
    pub fn new(name: impl Into<String>, expression: Expr) -> Self {
        let db_type = expression.db_type();
        Self { name: name.into(), expression, db_type }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnExpr {
    pub alias: TableAlias,
    pub name: String,
    pub db_type: DbType,
}

#[derive(Debug, Clone)]
pub struct SubqueryColumnExpr {
    pub alias: TableAlias,
    pub name: String,
    /// Inline correlated subquery text; `{0}` is replaced by the alias name.
    pub template: String,
    pub db_type: DbType,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub value: Literal,
}

#[derive(Debug, Clone)]
pub struct NamedValue {
    pub name: String,
    pub value: Expr,
    pub db_type: DbType,
}

#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: Expr,
    pub right: Expr,
}

#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Expr,
}

#[derive(Debug, Clone)]
pub struct ConditionalExpr {
    pub test: Expr,
    pub if_true: Expr,
    pub if_false: Expr,
}

#[derive(Debug, Clone)]
pub struct BetweenExpr {
    pub arg: Expr,
    pub lower: Expr,
    pub upper: Expr,
}

#[derive(Debug, Clone)]
pub struct FunctionExpr {
    pub name: String,
    pub args: Vec<Expr>,
    pub db_type: DbType,
}

#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub kind: AggregateKind,
    pub argument: Option<Expr>,
    pub is_distinct: bool,
    pub db_type: DbType,
}

#[derive(Debug, Clone)]
pub struct AggregateSubqueryExpr {
    pub group_by_alias: TableAlias,
    pub aggregate_in_group_select: Expr,
    pub aggregate_as_subquery: Arc<SelectExpr>,
}

#[derive(Debug, Clone)]
pub enum InSource {
    Select(Arc<SelectExpr>),
    Values(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub struct InExpr {
    pub expr: Expr,
    pub source: InSource,
}

#[derive(Debug, Clone)]
pub struct TableExpr {
    pub alias: TableAlias,
    pub name: String,
    pub entity: String,
}

#[derive(Debug, Clone)]
pub struct SelectExpr {
    pub alias: TableAlias,
    pub columns: Vec<ColumnDeclaration>,
    pub from: Option<Expr>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderExpr>,
    pub group_by: Vec<Expr>,
    pub is_distinct: bool,
    pub skip: Option<Expr>,
    pub take: Option<Expr>,
    pub having: Option<Expr>,
    pub is_reverse: bool,
    pub segment: Option<PagingSpec>,
}

#[derive(Debug, Clone)]
pub struct JoinExpr {
    pub join_type: JoinType,
    pub left: Expr,
    pub right: Expr,
    pub condition: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct ProjectionExpr {
    pub select: Arc<SelectExpr>,
    pub projector: Expr,
    pub aggregator: Option<Aggregator>,
    pub is_no_tracking: bool,
}

#[derive(Debug, Clone)]
pub struct ClientJoinExpr {
    pub projection: ProjectionExpr,
    pub outer_key: Vec<Expr>,
    pub inner_key: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct OuterJoinedExpr {
    pub test: Expr,
    pub expr: Expr,
}

#[derive(Debug, Clone)]
pub struct NewExpr {
    pub members: Vec<(String, Expr)>,
}

#[derive(Debug, Clone)]
pub struct EntityExpr {
    pub entity: String,
    /// Always a `New` holding one member per loaded property.
    pub init: Expr,
    pub is_no_tracking: bool,
}

/// Access to a relationship member whose expansion is deferred to the
/// relationship binder.
#[derive(Debug, Clone)]
pub struct MemberExpr {
    pub expr: Expr,
    pub member: String,
}

#[derive(Debug, Clone)]
pub struct GroupingExpr {
    pub key: Expr,
    /// Always a `Projection`: the element subquery correlated to the key.
    pub elements: Expr,
}

#[derive(Debug, Clone)]
pub struct ColumnAssignment {
    pub column: String,
    pub db_type: DbType,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct InsertCommand {
    pub table: TableExpr,
    pub assignments: Vec<ColumnAssignment>,
}

#[derive(Debug, Clone)]
pub struct UpdateCommand {
    pub table: TableExpr,
    pub where_clause: Option<Expr>,
    pub assignments: Vec<ColumnAssignment>,
}

#[derive(Debug, Clone)]
pub struct DeleteCommand {
    pub table: TableExpr,
    pub where_clause: Option<Expr>,
}

/// The closed set of IR node kinds.
#[derive(Debug, Clone)]
pub enum DbExpr {
    Literal(Literal),
    Variable(Variable),
    NamedValue(NamedValue),
    Column(ColumnExpr),
    SubqueryColumn(SubqueryColumnExpr),
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    Conditional(ConditionalExpr),
    IsNull(Expr),
    Between(BetweenExpr),
    Function(FunctionExpr),
    RowNumber(Vec<OrderExpr>),
    Aggregate(AggregateExpr),
    AggregateSubquery(AggregateSubqueryExpr),
    Scalar(Arc<SelectExpr>),
    Exists(Arc<SelectExpr>),
    In(InExpr),
    Table(TableExpr),
    Select(Arc<SelectExpr>),
    Join(JoinExpr),
    Projection(ProjectionExpr),
    ClientJoin(ClientJoinExpr),
    OuterJoined(OuterJoinedExpr),
    New(NewExpr),
    Entity(EntityExpr),
    Member(MemberExpr),
    Grouping(GroupingExpr),
    Insert(InsertCommand),
    Update(UpdateCommand),
    Delete(DeleteCommand),
    Block(Vec<Expr>),
}

impl DbExpr {
    pub fn literal(value: impl Into<Literal>) -> Expr {
        Arc::new(DbExpr::Literal(value.into()))
    }

    pub fn null() -> Expr {
        Arc::new(DbExpr::Literal(Literal::Null))
    }

    pub fn column(alias: TableAlias, name: impl Into<String>, db_type: DbType) -> Expr {
        Arc::new(DbExpr::Column(ColumnExpr { alias, name: name.into(), db_type }))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Arc::new(DbExpr::Binary(BinaryExpr { op, left, right }))
    }

    pub fn equal(left: Expr, right: Expr) -> Expr {
        Self::binary(BinaryOp::Equal, left, right)
    }

    pub fn and(left: Expr, right: Expr) -> Expr {
        Self::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: Expr, right: Expr) -> Expr {
        Self::binary(BinaryOp::Or, left, right)
    }

    pub fn not(operand: Expr) -> Expr {
        Arc::new(DbExpr::Unary(UnaryExpr { op: UnaryOp::Not, operand }))
    }

    pub fn is_null_test(operand: Expr) -> Expr {
        Arc::new(DbExpr::IsNull(operand))
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>, db_type: DbType) -> Expr {
        Arc::new(DbExpr::Function(FunctionExpr { name: name.into(), args, db_type }))
    }

    pub fn aggregate(kind: AggregateKind, argument: Option<Expr>, is_distinct: bool) -> Expr {
        let db_type = match kind {
            AggregateKind::Count => DbType::Int,
            AggregateKind::Average => DbType::Float,
            _ => argument.as_ref().map(|a| a.db_type()).unwrap_or_default(),
        };
        Arc::new(DbExpr::Aggregate(AggregateExpr { kind, argument, is_distinct, db_type }))
    }

    pub fn select(select: SelectExpr) -> Expr {
        Arc::new(DbExpr::Select(Arc::new(select)))
    }

    pub fn from_select(select: Arc<SelectExpr>) -> Expr {
        Arc::new(DbExpr::Select(select))
    }

    pub fn join(join_type: JoinType, left: Expr, right: Expr, condition: Option<Expr>) -> Expr {
        Arc::new(DbExpr::Join(JoinExpr { join_type, left, right, condition }))
    }

    pub fn projection(select: Arc<SelectExpr>, projector: Expr, aggregator: Option<Aggregator>) -> Expr {
        Arc::new(DbExpr::Projection(ProjectionExpr::new(select, projector, aggregator)))
    }

    pub fn new_record(members: Vec<(String, Expr)>) -> Expr {
        Arc::new(DbExpr::New(NewExpr { members }))
    }

    pub fn outer_joined(test: Expr, expr: Expr) -> Expr {
        Arc::new(DbExpr::OuterJoined(OuterJoinedExpr { test, expr }))
    }

    /// AND together a list of predicates; `None` for an empty list.
    pub fn conjunction(parts: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        parts.into_iter().reduce(DbExpr::and)
    }

    /// Combine two optional predicates with AND.
    pub fn and_also(left: Option<Expr>, right: Option<Expr>) -> Option<Expr> {
        match (left, right) {
            (Some(l), Some(r)) => Some(DbExpr::and(l, r)),
            (l, None) => l,
            (None, r) => r,
        }
    }

    /// Flatten a tree of ANDs into its conjuncts.
    pub fn split_conjuncts(expr: &Expr) -> Vec<Expr> {
        match expr.as_ref() {
            DbExpr::Binary(b) if b.op == BinaryOp::And => {
                let mut parts = Self::split_conjuncts(&b.left);
                parts.extend(Self::split_conjuncts(&b.right));
                parts
            }
            _ => vec![expr.clone()],
        }
    }

    pub fn db_type(&self) -> DbType {
        match self {
            DbExpr::Literal(l) => DbType::of_literal(l),
            DbExpr::Variable(v) => DbType::of_literal(&v.value),
            DbExpr::NamedValue(n) => n.db_type,
            DbExpr::Column(c) => c.db_type,
            DbExpr::SubqueryColumn(c) => c.db_type,
            DbExpr::Binary(b) if b.op == BinaryOp::Concat => DbType::String,
            DbExpr::Binary(b) if b.op.is_arithmetic() => DbType::promote(b.left.db_type(), b.right.db_type()),
            DbExpr::Binary(_) => DbType::Bool,
            DbExpr::Unary(u) if u.op == UnaryOp::Not => DbType::Bool,
            DbExpr::Unary(u) => u.operand.db_type(),
            DbExpr::Conditional(c) => DbType::promote(c.if_true.db_type(), c.if_false.db_type()),
            DbExpr::IsNull(_) | DbExpr::Between(_) | DbExpr::Exists(_) | DbExpr::In(_) => DbType::Bool,
            DbExpr::Function(f) => f.db_type,
            DbExpr::RowNumber(_) => DbType::Int,
            DbExpr::Aggregate(a) => a.db_type,
            DbExpr::AggregateSubquery(a) => a.aggregate_in_group_select.db_type(),
            DbExpr::Scalar(s) => s.columns.first().map(|c| c.db_type).unwrap_or_default(),
            DbExpr::OuterJoined(o) => o.expr.db_type(),
            _ => DbType::Unknown,
        }
    }

    /// True for nodes that produce a boolean condition in SQL.
    pub fn is_predicate(&self) -> bool {
        match self {
            DbExpr::Binary(b) => b.op.is_comparison() || b.op.is_logical(),
            DbExpr::Unary(u) => u.op == UnaryOp::Not,
            DbExpr::IsNull(_) | DbExpr::Between(_) | DbExpr::Exists(_) | DbExpr::In(_) => true,
            DbExpr::Function(f) => crate::dialect::is_predicate_function(&f.name),
            _ => false,
        }
    }

    pub fn as_column(&self) -> Option<&ColumnExpr> {
        match self {
            DbExpr::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_select(&self) -> Option<&Arc<SelectExpr>> {
        match self {
            DbExpr::Select(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_projection(&self) -> Option<&ProjectionExpr> {
        match self {
            DbExpr::Projection(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            DbExpr::Literal(l) => Some(l),
            _ => None,
        }
    }

    /// Alias declared by a table or select node.
    pub fn declared_alias(&self) -> Option<TableAlias> {
        match self {
            DbExpr::Table(t) => Some(t.alias),
            DbExpr::Select(s) => Some(s.alias),
            _ => None,
        }
    }
}

impl SelectExpr {
    pub fn new(alias: TableAlias, columns: Vec<ColumnDeclaration>, from: Option<Expr>, where_clause: Option<Expr>) -> Self {
        Self {
            alias,
            columns,
            from,
            where_clause,
            order_by: Vec::new(),
            group_by: Vec::new(),
            is_distinct: false,
            skip: None,
            take: None,
            having: None,
            is_reverse: false,
            segment: None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDeclaration> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// A reference to one of this select's declared columns.
    pub fn column_ref(&self, name: &str) -> Option<Expr> {
        self.column(name).map(|c| DbExpr::column(self.alias, c.name.clone(), c.db_type))
    }

    /// First name derived from `base` not already declared by this select.
    pub fn available_column_name(&self, base: &str) -> String {
        Self::available_name(&self.columns, base)
    }

    pub fn available_name(columns: &[ColumnDeclaration], base: &str) -> String {
        let mut name = base.to_string();
        let mut n = 1usize;
        while columns.iter().any(|c| c.name == name) {
            name = format!("{}{}", base, n);
            n += 1;
        }
        name
    }

    pub fn with_columns(&self, columns: Vec<ColumnDeclaration>) -> Arc<SelectExpr> {
        Arc::new(SelectExpr { columns, ..self.clone() })
    }

    pub fn with_where(&self, where_clause: Option<Expr>) -> Arc<SelectExpr> {
        Arc::new(SelectExpr { where_clause, ..self.clone() })
    }

    pub fn with_from(&self, from: Option<Expr>) -> Arc<SelectExpr> {
        Arc::new(SelectExpr { from, ..self.clone() })
    }

    pub fn with_order_by(&self, order_by: Vec<OrderExpr>) -> Arc<SelectExpr> {
        Arc::new(SelectExpr { order_by, ..self.clone() })
    }

    pub fn with_paging(&self, skip: Option<Expr>, take: Option<Expr>) -> Arc<SelectExpr> {
        Arc::new(SelectExpr { skip, take, ..self.clone() })
    }

    pub fn add_column(&self, column: ColumnDeclaration) -> Arc<SelectExpr> {
        let mut columns = self.columns.clone();
        columns.push(column);
        self.with_columns(columns)
    }

    pub fn remove_column(&self, name: &str) -> Arc<SelectExpr> {
        self.with_columns(self.columns.iter().filter(|c| c.name != name).cloned().collect())
    }

    /// Push this select's whole body into a new inner select aliased
    /// `new_alias`, keeping this select's alias on the outer shell so every
    /// outside reference stays valid.
    pub fn add_redundant_select(&self, new_alias: TableAlias) -> Arc<SelectExpr> {
        let outer_columns = self
            .columns
            .iter()
            .map(|c| ColumnDeclaration {
                name: c.name.clone(),
                expression: DbExpr::column(new_alias, c.name.clone(), c.db_type),
                db_type: c.db_type,
            })
            .collect();
        let inner = SelectExpr { alias: new_alias, segment: None, ..self.clone() };
        let mut outer = SelectExpr::new(self.alias, outer_columns, Some(DbExpr::select(inner)), None);
        outer.segment = self.segment;
        Arc::new(outer)
    }

    pub fn has_order_by(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub fn has_group_by(&self) -> bool {
        !self.group_by.is_empty()
    }
}

impl ProjectionExpr {
    pub fn new(select: Arc<SelectExpr>, projector: Expr, aggregator: Option<Aggregator>) -> Self {
        Self { select, projector, aggregator, is_no_tracking: false }
    }

    pub fn is_singleton(&self) -> bool {
        self.aggregator.is_some()
    }

    pub fn into_expr(self) -> Expr {
        Arc::new(DbExpr::Projection(self))
    }
}

impl TableExpr {
    pub fn column(&self, name: impl Into<String>, db_type: DbType) -> Expr {
        DbExpr::column(self.alias, name, db_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(alias: TableAlias, name: &str) -> Expr {
        DbExpr::column(alias, name, DbType::Int)
    }

    #[test]
    fn split_and_rejoin_conjuncts() {
        let a = TableAlias::new();
        let p = DbExpr::and(
            DbExpr::and(DbExpr::equal(col(a, "x"), DbExpr::literal(1)), DbExpr::equal(col(a, "y"), DbExpr::literal(2))),
            DbExpr::is_null_test(col(a, "z")),
        );
        let parts = DbExpr::split_conjuncts(&p);
        assert_eq!(parts.len(), 3);
        assert!(DbExpr::conjunction(parts).is_some());
        assert!(DbExpr::conjunction(Vec::new()).is_none());
    }

    #[test]
    fn type_inference_for_common_nodes() {
        let a = TableAlias::new();
        assert_eq!(DbExpr::aggregate(AggregateKind::Count, None, false).db_type(), DbType::Int);
        assert_eq!(DbExpr::aggregate(AggregateKind::Average, Some(col(a, "x")), false).db_type(), DbType::Float);
        let sum = DbExpr::binary(BinaryOp::Add, col(a, "x"), DbExpr::literal(1.5));
        assert_eq!(sum.db_type(), DbType::Float);
        assert!(DbExpr::equal(col(a, "x"), col(a, "y")).is_predicate());
        assert!(!sum.is_predicate());
    }

    #[test]
    fn redundant_select_keeps_outer_alias() {
        let t = TableAlias::new();
        let s = TableAlias::new();
        let inner = TableAlias::new();
        let table = Arc::new(DbExpr::Table(TableExpr { alias: t, name: "Customers".into(), entity: "Customer".into() }));
        let mut sel = SelectExpr::new(s, vec![ColumnDeclaration::new("ID", col(t, "ID"))], Some(table), None);
        sel.take = Some(DbExpr::literal(5));
        let wrapped = sel.add_redundant_select(inner);
        assert_eq!(wrapped.alias, s);
        assert!(wrapped.take.is_none());
        let from = wrapped.from.as_ref().and_then(|f| f.as_select().cloned()).unwrap();
        assert_eq!(from.alias, inner);
        assert!(from.take.is_some());
        assert_eq!(wrapped.available_column_name("ID"), "ID1");
    }
}
