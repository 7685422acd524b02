use std::{collections::HashMap, ptr, sync::Arc};

use crate::{
    dialect::{is_predicate_function, FunctionRegistry, SqlSyntax},
    ir::{
        BinaryOp, ConditionalExpr, DbExpr, DbType, Expr, Literal, NewExpr, ProjectionExpr, TableAlias, UnaryExpr,
        Variable,
    },
    metadata::MetadataProvider,
    query::{Operator, ParamId, QueryExpr},
    translator::{binder::binder_for, QueryMapping, TranslateError, TranslateOptions, TranslateResult},
};

/// Group select a group's element subquery belongs to, and the element
/// expression over the group select's source.
#[derive(Debug, Clone)]
pub struct GroupByInfo {
    pub alias: TableAlias,
    pub element: Expr,
    /// Keeps the keyed node alive so its address is not reused.
    pub(crate) _elements: Expr,
}

/// Lowers a [`QueryExpr`] operator chain into IR, producing one root
/// projection or command.
pub struct QueryBinder<'a> {
    pub(crate) metadata: &'a dyn MetadataProvider,
    pub(crate) syntax: &'a dyn SqlSyntax,
    pub(crate) functions: &'a FunctionRegistry,
    pub(crate) options: &'a TranslateOptions,
    map: HashMap<ParamId, Expr>,
    pub(crate) group_by_map: HashMap<*const DbExpr, GroupByInfo>,
    pub(crate) then_bys: Vec<(bool, QueryExpr)>,
    root: *const QueryExpr,
}

impl<'a> QueryBinder<'a> {
    pub fn new(
        metadata: &'a dyn MetadataProvider,
        syntax: &'a dyn SqlSyntax,
        functions: &'a FunctionRegistry,
        options: &'a TranslateOptions,
    ) -> Self {
        Self {
            metadata,
            syntax,
            functions,
            options,
            map: HashMap::new(),
            group_by_map: HashMap::new(),
            then_bys: Vec::new(),
            root: ptr::null(),
        }
    }

    pub fn bind(&mut self, query: &QueryExpr) -> TranslateResult<Expr> {
        self.root = query as *const QueryExpr;
        self.bind_expr(query)
    }

    pub fn bind_expr(&mut self, query: &QueryExpr) -> TranslateResult<Expr> {
        match query {
            QueryExpr::Table { entity } => {
                let info = QueryMapping::entity_info(self.metadata, entity)?;
                Ok(QueryMapping::table_projection(&info, self.options.no_tracking).into_expr())
            }
            QueryExpr::Constant(l) => Ok(DbExpr::literal(l.clone())),
            QueryExpr::Variable { name, value } => {
                Ok(Arc::new(DbExpr::Variable(Variable { name: name.clone(), value: value.clone() })))
            }
            QueryExpr::Param(p) => self
                .map
                .get(p)
                .cloned()
                .ok_or_else(|| TranslateError::unsupported("unbound parameter", p)),
            QueryExpr::Member { expr, name } => {
                let source = self.bind_expr(expr)?;
                QueryMapping::bind_member(self.metadata, &source, name)
            }
            QueryExpr::Binary { op, left, right } => {
                let l = self.bind_expr(left)?;
                let r = self.bind_expr(right)?;
                Ok(Self::binary(*op, l, r))
            }
            QueryExpr::Unary { op, operand } => {
                let o = self.bind_expr(operand)?;
                Ok(Arc::new(DbExpr::Unary(UnaryExpr { op: *op, operand: o })))
            }
            QueryExpr::Conditional { test, if_true, if_false } => Ok(Arc::new(DbExpr::Conditional(ConditionalExpr {
                test: self.bind_expr(test)?,
                if_true: self.bind_expr(if_true)?,
                if_false: self.bind_expr(if_false)?,
            }))),
            QueryExpr::New { members } => {
                let mut bound = Vec::with_capacity(members.len());
                for (name, e) in members {
                    bound.push((name.clone(), self.bind_expr(e)?));
                }
                Ok(Arc::new(DbExpr::New(NewExpr { members: bound })))
            }
            QueryExpr::Function { name, args } => self.bind_function(name, args),
            QueryExpr::Call { op, args } => {
                let is_root = ptr::eq(query, self.root);
                let bind = binder_for(*op).ok_or_else(|| TranslateError::unsupported("operator", op))?;
                bind(self, args, is_root)
            }
            QueryExpr::Lambda { .. }
            | QueryExpr::ValueList(_)
            | QueryExpr::EntityList { .. }
            | QueryExpr::Row(_) => Err(TranslateError::unsupported("expression", query)),
        }
    }

    /// Comparisons against a NULL literal become IS NULL tests.
    fn binary(op: BinaryOp, l: Expr, r: Expr) -> Expr {
        let is_null = |e: &Expr| e.as_literal().is_some_and(Literal::is_null);
        match op {
            BinaryOp::Equal | BinaryOp::NotEqual if is_null(&l) || is_null(&r) => {
                let operand = if is_null(&r) { l } else { r };
                let test = DbExpr::is_null_test(operand);
                if op == BinaryOp::Equal { test } else { DbExpr::not(test) }
            }
            _ => DbExpr::binary(op, l, r),
        }
    }

    fn bind_function(&mut self, name: &str, args: &[QueryExpr]) -> TranslateResult<Expr> {
        let mut bound = Vec::with_capacity(args.len());
        for a in args {
            bound.push(self.bind_expr(a)?);
        }
        let lname = name.to_ascii_lowercase();
        let db_type = match lname.as_str() {
            "upper" | "lower" | "trim" | "substring" | "concat" => DbType::String,
            "length" | "year" | "month" | "day" => DbType::Int,
            "now" | "add_days" => DbType::DateTime,
            "abs" | "round" => bound.first().map(|a| a.db_type()).unwrap_or_default(),
            n if is_predicate_function(n) => DbType::Bool,
            _ => match self.functions.get(&lname) {
                Some(f) => f.db_type,
                None => return Err(TranslateError::unsupported("function", format!("{}({} args)", name, args.len()))),
            },
        };
        Ok(DbExpr::function(lname, bound, db_type))
    }

    /// Bind a lambda body with its parameters mapped to `values`.
    pub fn bind_lambda(&mut self, lambda: &QueryExpr, values: &[Expr]) -> TranslateResult<Expr> {
        let (params, body) = lambda.as_lambda().ok_or_else(|| TranslateError::unsupported("lambda argument", lambda))?;
        if params.len() != values.len() {
            return Err(TranslateError::invalid(format!(
                "lambda takes {} parameter(s), {} supplied",
                params.len(),
                values.len()
            )));
        }
        for (p, v) in params.iter().zip(values) {
            self.map.insert(*p, v.clone());
        }
        let result = self.bind_expr(body);
        for p in params {
            self.map.remove(p);
        }
        result
    }

    /// Bind a sequence source, returning the node the projection came from
    /// (used as the group-by correlation key) along with the projection.
    pub fn bind_source(&mut self, query: &QueryExpr) -> TranslateResult<(Expr, ProjectionExpr)> {
        let bound = self.bind_expr(query)?;
        if let DbExpr::Member(member) = bound.as_ref() {
            let (_, projection) = QueryMapping::relationship_projection(self.metadata, member, self.options.no_tracking)?;
            return Ok((bound, projection));
        }
        Self::as_sequence(&bound).ok_or_else(|| TranslateError::unsupported("sequence source", query))
    }

    pub fn bind_sequence(&mut self, query: &QueryExpr) -> TranslateResult<ProjectionExpr> {
        self.bind_source(query).map(|(_, p)| p)
    }

    fn as_sequence(expr: &Expr) -> Option<(Expr, ProjectionExpr)> {
        match expr.as_ref() {
            DbExpr::Projection(p) => Some((expr.clone(), p.clone())),
            DbExpr::Grouping(g) => g.elements.as_projection().map(|p| (g.elements.clone(), p.clone())),
            _ => None,
        }
    }

    pub(crate) fn group_info(&self, source: &Expr) -> Option<&GroupByInfo> {
        self.group_by_map.get(&Arc::as_ptr(source))
    }
}

pub(crate) fn arg<'q>(args: &'q [QueryExpr], index: usize, op: Operator) -> TranslateResult<&'q QueryExpr> {
    args.get(index).ok_or_else(|| TranslateError::invalid(format!("{} is missing argument {}", op, index)))
}
