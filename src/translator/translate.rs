use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    dialect::{FunctionRegistry, SqlSyntax},
    ir::{
        walk_visit, walk_visit_select, Aggregator, ColumnExpr, ColumnReplacer, DbExpr, DbVisitor, Expr, NamedValue,
        PagingSpec, ProjectionExpr, SelectExpr, TableAlias,
    },
    metadata::{MetadataProvider, PolicySource},
    query::QueryExpr,
    translator::{
        Parameterizer, QueryBinder, QueryParameter, QueryPipeline, SqlFormatter, TranslateError, TranslateOptions,
        TranslateResult, TranslationError,
    },
};

/// An outer column feeding a parameter of a nested statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub parameter: String,
    pub column: String,
}

/// A collection nested in the root result, fetched by its own statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedResult {
    /// Member path of the collection inside the parent's shape, `.` separated.
    pub member: String,
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
    /// Set when the statement runs once per parent row.
    pub correlation: Vec<Correlation>,
    /// Set when the statement runs once and rows are matched to parents on
    /// these keys.
    pub outer_key: Vec<String>,
    pub inner_key: Vec<String>,
    pub nested: Vec<NestedResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    /// Every statement, separated by `;` and a line break.
    pub sql: String,
    pub statements: Vec<String>,
    pub parameters: Vec<QueryParameter>,
    pub paging: Option<PagingSpec>,
    pub aggregator: Option<Aggregator>,
    pub nested: Vec<NestedResult>,
}

/// Entry point: binds an operator chain, optimizes it and writes dialect
/// SQL with its parameters.
pub struct Translator<'a> {
    metadata: &'a dyn MetadataProvider,
    syntax: &'a dyn SqlSyntax,
    policies: Option<&'a dyn PolicySource>,
    functions: FunctionRegistry,
    options: TranslateOptions,
}

impl<'a> Translator<'a> {
    pub fn new(metadata: &'a dyn MetadataProvider, syntax: &'a dyn SqlSyntax) -> Self {
        Self { metadata, syntax, policies: None, functions: FunctionRegistry::new(), options: TranslateOptions::default() }
    }

    pub fn with_policies(mut self, policies: &'a dyn PolicySource) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_options(mut self, options: TranslateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &TranslateOptions {
        &self.options
    }

    pub fn translate(&self, query: &QueryExpr) -> Result<TranslationResult, TranslationError> {
        self.run(query).map_err(|e| TranslationError::new(e, query.to_string()))
    }

    fn run(&self, query: &QueryExpr) -> TranslateResult<TranslationResult> {
        let bound = QueryBinder::new(self.metadata, self.syntax, &self.functions, &self.options).bind(query)?;
        trace!(ir = %bound, "bound query");

        let pipeline = QueryPipeline::new(self.metadata, self.syntax, &self.functions, &self.options, self.policies);
        let optimized = pipeline.optimize(&bound)?;
        trace!(ir = %optimized, "optimized query");

        let parameterized = Parameterizer::parameterize(&optimized, self.options.inline_literals)?;
        let commands = match parameterized.as_ref() {
            DbExpr::Block(commands) => commands.clone(),
            _ => vec![parameterized.clone()],
        };

        let mut statements = Vec::with_capacity(commands.len());
        let mut parameters: IndexMap<String, QueryParameter> = IndexMap::new();
        let mut nested = Vec::new();
        for command in &commands {
            let formatted = self.formatter().format(command)?;
            statements.push(formatted.sql);
            for p in formatted.parameters {
                parameters.entry(p.name.clone()).or_insert(p);
            }
            if let (DbExpr::Projection(p), false) = (command.as_ref(), self.options.where_only) {
                self.collect_nested(&p.projector, &p.select, "", &mut nested)?;
            }
        }

        let root = commands.last().and_then(|c| c.as_projection());
        let result = TranslationResult {
            sql: statements.join(";\n"),
            statements,
            parameters: parameters.into_values().collect(),
            paging: commands.first().and_then(|c| c.as_projection()).and_then(|p| p.select.segment),
            aggregator: root.and_then(|p| p.aggregator),
            nested,
        };
        debug!(sql = %result.sql, parameters = result.parameters.len(), nested = result.nested.len(), "translated query");
        Ok(result)
    }

    fn formatter(&self) -> SqlFormatter<'_> {
        SqlFormatter::new(self.syntax, &self.functions, &self.options)
    }

    /// Find the collections of a projector and turn each into its own
    /// statement. Shapes are searched member by member so every result
    /// knows where it belongs.
    fn collect_nested(&self, expr: &Expr, outer: &SelectExpr, path: &str, out: &mut Vec<NestedResult>) -> TranslateResult<()> {
        match expr.as_ref() {
            DbExpr::New(record) => {
                for (name, member) in &record.members {
                    self.collect_nested(member, outer, &member_path(path, name), out)?;
                }
            }
            DbExpr::Entity(e) => self.collect_nested(&e.init, outer, path, out)?,
            DbExpr::OuterJoined(o) => self.collect_nested(&o.expr, outer, path, out)?,
            DbExpr::Conditional(c) => {
                self.collect_nested(&c.if_true, outer, path, out)?;
                self.collect_nested(&c.if_false, outer, path, out)?;
            }
            DbExpr::Grouping(g) => {
                self.collect_nested(&g.key, outer, &member_path(path, "Key"), out)?;
                self.collect_nested(&g.elements, outer, path, out)?;
            }
            DbExpr::Projection(p) => out.push(self.correlated(p, outer, path)?),
            DbExpr::ClientJoin(j) => {
                let mut result = self.statement(&j.projection, path)?;
                result.outer_key = j.outer_key.iter().map(key_name).collect();
                result.inner_key = j.inner_key.iter().map(key_name).collect();
                out.push(result);
            }
            _ => {}
        }
        Ok(())
    }

    /// A nested projection run per parent row: references to the parent's
    /// columns become parameters `n0`, `n1`, …
    fn correlated(&self, projection: &ProjectionExpr, outer: &SelectExpr, path: &str) -> TranslateResult<NestedResult> {
        let mut scan = OuterReferences::default();
        scan.visit_select(&projection.select);
        let outer_columns: Vec<&ColumnExpr> =
            scan.columns.iter().filter(|c| !scan.declared.contains(&c.alias)).collect();

        let mut map: HashMap<TableAlias, HashMap<String, Expr>> = HashMap::new();
        let mut correlation = Vec::new();
        for column in outer_columns {
            let slot = map.entry(column.alias).or_default();
            if slot.contains_key(&column.name) {
                continue;
            }
            let parameter = format!("n{}", correlation.len());
            if column.alias != outer.alias {
                debug!(parameter = %parameter, column = %column.name, "nested statement references a grandparent row");
            }
            slot.insert(
                column.name.clone(),
                Arc::new(DbExpr::NamedValue(NamedValue {
                    name: parameter.clone(),
                    value: Arc::new(DbExpr::Column(column.clone())),
                    db_type: column.db_type,
                })),
            );
            correlation.push(Correlation { parameter, column: column.name.clone() });
        }

        let select = match ColumnReplacer::replace(&DbExpr::from_select(projection.select.clone()), &map)?.as_ref() {
            DbExpr::Select(s) => s.clone(),
            _ => return Err(TranslateError::invalid("nested projection lost its select")),
        };
        let mut result = self.statement(&ProjectionExpr { select, ..projection.clone() }, path)?;
        result.correlation = correlation;
        Ok(result)
    }

    fn statement(&self, projection: &ProjectionExpr, path: &str) -> TranslateResult<NestedResult> {
        let formatted = self.formatter().format(&DbExpr::from_select(projection.select.clone()))?;
        let mut nested = Vec::new();
        self.collect_nested(&projection.projector, &projection.select, "", &mut nested)?;
        Ok(NestedResult {
            member: path.to_string(),
            sql: formatted.sql,
            parameters: formatted.parameters,
            correlation: Vec::new(),
            outer_key: Vec::new(),
            inner_key: Vec::new(),
            nested,
        })
    }
}

fn member_path(parent: &str, name: &str) -> String {
    if parent.is_empty() { name.to_string() } else { format!("{}.{}", parent, name) }
}

fn key_name(key: &Expr) -> String {
    match key.as_column() {
        Some(c) => c.name.clone(),
        None => key.to_string(),
    }
}

/// Columns of a select together with every alias it declares at any depth.
#[derive(Default)]
struct OuterReferences {
    declared: Vec<TableAlias>,
    columns: Vec<ColumnExpr>,
}

impl DbVisitor for OuterReferences {
    fn visit(&mut self, expr: &Expr) {
        if let DbExpr::Table(t) = expr.as_ref() {
            self.declared.push(t.alias);
        }
        walk_visit(self, expr)
    }

    fn visit_select(&mut self, select: &SelectExpr) {
        self.declared.push(select.alias);
        walk_visit_select(self, select)
    }

    fn visit_column(&mut self, column: &ColumnExpr) {
        self.columns.push(column.clone());
    }
}
