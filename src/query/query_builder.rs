use crate::{
    ir::{BinaryOp, Literal, UnaryOp},
    query::{EntityRow, Operator, ParamId, QueryExpr},
};

impl From<Literal> for QueryExpr {
    fn from(value: Literal) -> Self {
        QueryExpr::Constant(value)
    }
}

macro_rules! constant_from {
    ($($t:ty),*) => {
        $(impl From<$t> for QueryExpr {
            fn from(value: $t) -> Self { QueryExpr::Constant(Literal::from(value)) }
        })*
    };
}

constant_from!(i64, i32, f64, bool, &str, String, chrono::NaiveDateTime, uuid::Uuid);

fn call(op: Operator, args: Vec<QueryExpr>) -> QueryExpr {
    QueryExpr::Call { op, args }
}

/// Sources and leaf values.
impl QueryExpr {
    pub fn table(entity: &str) -> Self {
        QueryExpr::Table { entity: entity.to_string() }
    }

    pub fn lit(value: impl Into<Literal>) -> Self {
        QueryExpr::Constant(value.into())
    }

    pub fn null() -> Self {
        QueryExpr::Constant(Literal::Null)
    }

    pub fn var(name: &str, value: impl Into<Literal>) -> Self {
        QueryExpr::Variable { name: name.to_string(), value: value.into() }
    }

    pub fn values<L: Into<Literal>>(values: impl IntoIterator<Item = L>) -> Self {
        QueryExpr::ValueList(values.into_iter().map(Into::into).collect())
    }

    pub fn entities(entity: &str, rows: Vec<EntityRow>) -> Self {
        QueryExpr::EntityList { entity: entity.to_string(), rows }
    }

    pub fn lambda(f: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        let p = ParamId::new();
        QueryExpr::Lambda { params: vec![p], body: Box::new(f(QueryExpr::Param(p))) }
    }

    pub fn lambda2(f: impl FnOnce(QueryExpr, QueryExpr) -> QueryExpr) -> Self {
        let (a, b) = (ParamId::new(), ParamId::new());
        QueryExpr::Lambda { params: vec![a, b], body: Box::new(f(QueryExpr::Param(a), QueryExpr::Param(b))) }
    }

    pub fn new_record<S: Into<String>>(members: impl IntoIterator<Item = (S, QueryExpr)>) -> Self {
        QueryExpr::New { members: members.into_iter().map(|(n, e)| (n.into(), e)).collect() }
    }

    pub fn func(name: &str, args: Vec<QueryExpr>) -> Self {
        QueryExpr::Function { name: name.to_string(), args }
    }

    pub fn iif(test: QueryExpr, if_true: impl Into<QueryExpr>, if_false: impl Into<QueryExpr>) -> Self {
        QueryExpr::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true.into()),
            if_false: Box::new(if_false.into()),
        }
    }
}

/// Scalar operators.
impl QueryExpr {
    pub fn m(self, name: &str) -> Self {
        QueryExpr::Member { expr: Box::new(self), name: name.to_string() }
    }

    /// Group key of a grouping parameter.
    pub fn key(self) -> Self {
        self.m("Key")
    }

    fn binary(self, op: BinaryOp, other: impl Into<QueryExpr>) -> Self {
        QueryExpr::Binary { op, left: Box::new(self), right: Box::new(other.into()) }
    }

    pub fn eq(self, other: impl Into<QueryExpr>) -> Self {
        self.binary(BinaryOp::Equal, other)
    }

    pub fn ne(self, other: impl Into<QueryExpr>) -> Self {
        self.binary(BinaryOp::NotEqual, other)
    }

    pub fn gt(self, other: impl Into<QueryExpr>) -> Self {
        self.binary(BinaryOp::GreaterThan, other)
    }

    pub fn ge(self, other: impl Into<QueryExpr>) -> Self {
        self.binary(BinaryOp::GreaterThanOrEqual, other)
    }

    pub fn lt(self, other: impl Into<QueryExpr>) -> Self {
        self.binary(BinaryOp::LessThan, other)
    }

    pub fn le(self, other: impl Into<QueryExpr>) -> Self {
        self.binary(BinaryOp::LessThanOrEqual, other)
    }

    pub fn like(self, pattern: impl Into<QueryExpr>) -> Self {
        self.binary(BinaryOp::Like, pattern)
    }

    pub fn and(self, other: QueryExpr) -> Self {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: QueryExpr) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        QueryExpr::Unary { op: UnaryOp::Not, operand: Box::new(self) }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: impl Into<QueryExpr>) -> Self {
        self.binary(BinaryOp::Add, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, other: impl Into<QueryExpr>) -> Self {
        self.binary(BinaryOp::Subtract, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, other: impl Into<QueryExpr>) -> Self {
        self.binary(BinaryOp::Multiply, other)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn div(self, other: impl Into<QueryExpr>) -> Self {
        self.binary(BinaryOp::Divide, other)
    }

    pub fn concat(self, other: impl Into<QueryExpr>) -> Self {
        self.binary(BinaryOp::Concat, other)
    }

    pub fn is_null(self) -> Self {
        self.eq(QueryExpr::null())
    }

    pub fn is_not_null(self) -> Self {
        self.ne(QueryExpr::null())
    }
}

/// Sequence operators.
impl QueryExpr {
    pub fn filter(self, predicate: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::Where, vec![self, QueryExpr::lambda(predicate)])
    }

    pub fn select(self, selector: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::Select, vec![self, QueryExpr::lambda(selector)])
    }

    pub fn select_many(self, collection: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::SelectMany, vec![self, QueryExpr::lambda(collection)])
    }

    pub fn select_many_with(
        self,
        collection: impl FnOnce(QueryExpr) -> QueryExpr,
        result: impl FnOnce(QueryExpr, QueryExpr) -> QueryExpr,
    ) -> Self {
        call(Operator::SelectMany, vec![self, QueryExpr::lambda(collection), QueryExpr::lambda2(result)])
    }

    pub fn join(
        self,
        inner: QueryExpr,
        outer_key: impl FnOnce(QueryExpr) -> QueryExpr,
        inner_key: impl FnOnce(QueryExpr) -> QueryExpr,
        result: impl FnOnce(QueryExpr, QueryExpr) -> QueryExpr,
    ) -> Self {
        call(
            Operator::Join,
            vec![self, inner, QueryExpr::lambda(outer_key), QueryExpr::lambda(inner_key), QueryExpr::lambda2(result)],
        )
    }

    pub fn group_by(self, key: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::GroupBy, vec![self, QueryExpr::lambda(key)])
    }

    pub fn group_by_with(
        self,
        key: impl FnOnce(QueryExpr) -> QueryExpr,
        element: impl FnOnce(QueryExpr) -> QueryExpr,
    ) -> Self {
        call(Operator::GroupBy, vec![self, QueryExpr::lambda(key), QueryExpr::lambda(element)])
    }

    pub fn order_by(self, key: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::OrderBy, vec![self, QueryExpr::lambda(key)])
    }

    pub fn order_by_desc(self, key: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::OrderByDescending, vec![self, QueryExpr::lambda(key)])
    }

    pub fn then_by(self, key: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::ThenBy, vec![self, QueryExpr::lambda(key)])
    }

    pub fn then_by_desc(self, key: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::ThenByDescending, vec![self, QueryExpr::lambda(key)])
    }

    pub fn skip(self, count: impl Into<QueryExpr>) -> Self {
        call(Operator::Skip, vec![self, count.into()])
    }

    pub fn take(self, count: impl Into<QueryExpr>) -> Self {
        call(Operator::Take, vec![self, count.into()])
    }

    pub fn distinct(self) -> Self {
        call(Operator::Distinct, vec![self])
    }

    pub fn reverse(self) -> Self {
        call(Operator::Reverse, vec![self])
    }

    pub fn default_if_empty(self) -> Self {
        call(Operator::DefaultIfEmpty, vec![self])
    }

    pub fn segment(self, page: i64, size: i64) -> Self {
        call(Operator::Segment, vec![self, QueryExpr::lit(page), QueryExpr::lit(size)])
    }
}

/// Terminal operators.
impl QueryExpr {
    pub fn count(self) -> Self {
        call(Operator::Count, vec![self])
    }

    pub fn count_where(self, predicate: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::Count, vec![self, QueryExpr::lambda(predicate)])
    }

    pub fn sum(self, selector: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::Sum, vec![self, QueryExpr::lambda(selector)])
    }

    pub fn min(self, selector: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::Min, vec![self, QueryExpr::lambda(selector)])
    }

    pub fn max(self, selector: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::Max, vec![self, QueryExpr::lambda(selector)])
    }

    pub fn average(self, selector: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::Average, vec![self, QueryExpr::lambda(selector)])
    }

    /// Aggregate over a sequence of scalars.
    pub fn aggregate(self, op: Operator) -> Self {
        call(op, vec![self])
    }

    pub fn first(self) -> Self {
        call(Operator::First, vec![self])
    }

    pub fn first_where(self, predicate: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::First, vec![self, QueryExpr::lambda(predicate)])
    }

    pub fn first_or_default(self) -> Self {
        call(Operator::FirstOrDefault, vec![self])
    }

    pub fn last(self) -> Self {
        call(Operator::Last, vec![self])
    }

    pub fn last_or_default(self) -> Self {
        call(Operator::LastOrDefault, vec![self])
    }

    pub fn single(self) -> Self {
        call(Operator::Single, vec![self])
    }

    pub fn single_or_default(self) -> Self {
        call(Operator::SingleOrDefault, vec![self])
    }

    pub fn any(self) -> Self {
        call(Operator::Any, vec![self])
    }

    pub fn any_where(self, predicate: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::Any, vec![self, QueryExpr::lambda(predicate)])
    }

    pub fn all(self, predicate: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::All, vec![self, QueryExpr::lambda(predicate)])
    }

    /// `value` is an element of this sequence.
    pub fn contains(self, value: impl Into<QueryExpr>) -> Self {
        call(Operator::Contains, vec![self, value.into()])
    }
}

/// Commands.
impl QueryExpr {
    pub fn insert(self, row: EntityRow) -> Self {
        call(Operator::Insert, vec![self, QueryExpr::Row(row)])
    }

    pub fn update(self, row: EntityRow) -> Self {
        call(Operator::Update, vec![self, QueryExpr::Row(row)])
    }

    /// Update guarded by an extra user check over the stored row.
    pub fn update_if(self, row: EntityRow, check: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::Update, vec![self, QueryExpr::Row(row), QueryExpr::lambda(check)])
    }

    pub fn delete(self, row: EntityRow) -> Self {
        call(Operator::Delete, vec![self, QueryExpr::Row(row)])
    }

    pub fn delete_where(self, predicate: impl FnOnce(QueryExpr) -> QueryExpr) -> Self {
        call(Operator::Delete, vec![self, QueryExpr::lambda(predicate)])
    }

    /// Apply `op` (insert, update or delete) to each row.
    pub fn batch(self, op: Operator, rows: Vec<EntityRow>) -> Self {
        let entity = match &self {
            QueryExpr::Table { entity } => entity.clone(),
            _ => String::new(),
        };
        call(Operator::Batch, vec![self, QueryExpr::entities(&entity, rows), QueryExpr::lit(op.name())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_nests_calls_source_first() {
        let q = QueryExpr::table("Customer").filter(|c| c.m("City").eq("London")).take(5);
        let QueryExpr::Call { op, args } = &q else { panic!("call expected") };
        assert_eq!(*op, Operator::Take);
        assert!(args[0].is_call(Operator::Where));
        assert_eq!(args[1], QueryExpr::lit(5));
        let inner = args[0].call_source().unwrap();
        assert_eq!(*inner, QueryExpr::table("Customer"));
    }

    #[test]
    fn lambdas_get_fresh_params() {
        let a = QueryExpr::lambda(|x| x);
        let b = QueryExpr::lambda(|x| x);
        assert_ne!(a, b);
        let (params, body) = a.as_lambda().unwrap();
        assert_eq!(*body, QueryExpr::Param(params[0]));
    }
}
