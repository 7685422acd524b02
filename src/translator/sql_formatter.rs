use std::{collections::HashMap, mem};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    dialect::{FunctionRegistry, SqlSyntax, TakeStyle},
    ir::{
        walk_visit, BinaryOp, ColumnDeclaration, DbExpr, DbType, DbVisitor, Expr, InSource, JoinType, Literal, OrderExpr,
        OrderType, SelectExpr, TableAlias, TableExpr, UnaryOp,
    },
    translator::{TranslateError, TranslateOptions, TranslateResult, GENERATED_IDENTITY},
};

/// A named value the caller binds when executing a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParameter {
    pub name: String,
    pub db_type: DbType,
    /// `Null` for parameters fed from an outer row at execution time.
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormattedStatement {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
}

/// Writes one IR statement as dialect SQL, collecting the parameters it
/// references in order of first appearance.
pub struct SqlFormatter<'a> {
    syntax: &'a dyn SqlSyntax,
    functions: &'a FunctionRegistry,
    options: &'a TranslateOptions,
    sb: String,
    depth: usize,
    aliases: HashMap<TableAlias, String>,
    next_alias: usize,
    /// Columns are written without their table alias. Only set for
    /// statements reading a single table.
    bare_columns: bool,
    parameters: IndexMap<String, QueryParameter>,
}

impl<'a> SqlFormatter<'a> {
    pub fn new(syntax: &'a dyn SqlSyntax, functions: &'a FunctionRegistry, options: &'a TranslateOptions) -> Self {
        Self {
            syntax,
            functions,
            options,
            sb: String::new(),
            depth: 0,
            aliases: HashMap::new(),
            next_alias: 0,
            bare_columns: false,
            parameters: IndexMap::new(),
        }
    }

    pub fn format(mut self, expr: &Expr) -> TranslateResult<FormattedStatement> {
        match expr.as_ref() {
            DbExpr::Projection(p) => self.write_statement(&p.select)?,
            DbExpr::Select(s) => self.write_statement(s)?,
            DbExpr::Insert(_) | DbExpr::Update(_) | DbExpr::Delete(_) => self.write_command(expr)?,
            DbExpr::Block(_) => return Err(TranslateError::invalid("a command block is formatted one command at a time")),
            _ => self.write_value(expr)?,
        }
        Ok(FormattedStatement { sql: self.sb, parameters: self.parameters.into_values().collect() })
    }

    fn write_statement(&mut self, select: &SelectExpr) -> TranslateResult<()> {
        self.bare_columns = self.options.hide_table_aliases && TableCounter::count(select) <= 1;
        if !self.options.where_only {
            return self.write_select(select);
        }
        match &select.where_clause {
            Some(w) => self.write_predicate(w),
            None => Ok(()),
        }
    }

    fn push(&mut self, text: &str) {
        self.sb.push_str(text);
    }

    fn new_line(&mut self) {
        self.sb.push('\n');
        for _ in 0..self.depth {
            self.sb.push_str("  ");
        }
    }

    fn quote(&self, name: &str) -> String {
        self.syntax.quote_identifier(name)
    }

    fn alias_name(&mut self, alias: TableAlias) -> String {
        if let Some(name) = self.aliases.get(&alias) {
            return name.clone();
        }
        let name = format!("t{}", self.next_alias);
        self.next_alias += 1;
        self.aliases.insert(alias, name.clone());
        name
    }

    /// Text a sub-expression renders to, without writing it.
    fn capture(&mut self, expr: &Expr) -> TranslateResult<String> {
        let saved = mem::take(&mut self.sb);
        let result = self.write_value(expr);
        let text = mem::replace(&mut self.sb, saved);
        result.map(|_| text)
    }

    fn write_list(&mut self, items: &[Expr]) -> TranslateResult<()> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.write_value(item)?;
        }
        Ok(())
    }

    fn write_select(&mut self, select: &SelectExpr) -> TranslateResult<()> {
        let (top, trailing) = match (self.syntax.take_style(), &select.skip, &select.take) {
            (_, None, None) => (None, false),
            (TakeStyle::Top, None, Some(take)) => (Some(take.clone()), false),
            (_, Some(_), _) if !self.syntax.supports_offset() => {
                return Err(TranslateError::unsupported(
                    format!("skip on {} without OFFSET", self.syntax.name()),
                    DbExpr::select(select.clone()),
                ));
            }
            _ => (None, true),
        };

        self.push("SELECT ");
        if select.is_distinct {
            self.push("DISTINCT ");
        }
        if let Some(take) = top {
            self.push("TOP ");
            if take.as_literal().is_some() {
                self.write_value(&take)?;
            } else {
                self.push("(");
                self.write_value(&take)?;
                self.push(")");
            }
            self.push(" ");
        }
        self.write_columns(&select.columns)?;
        if let Some(from) = &select.from {
            self.new_line();
            self.push("FROM ");
            self.write_source(from)?;
        }
        if let Some(w) = &select.where_clause {
            self.new_line();
            self.push("WHERE ");
            self.write_predicate(w)?;
        }
        if select.has_group_by() {
            self.new_line();
            self.push("GROUP BY ");
            self.write_list(&select.group_by)?;
        }
        if let Some(h) = &select.having {
            self.new_line();
            self.push("HAVING ");
            self.write_predicate(h)?;
        }
        if select.has_order_by() {
            self.new_line();
            self.push("ORDER BY ");
            self.write_orders(&select.order_by)?;
        } else if trailing && select.skip.is_some() && self.syntax.offset_requires_order() {
            self.new_line();
            self.push("ORDER BY (SELECT 1)");
        }
        if trailing {
            let skip = select.skip.as_ref().map(|s| self.capture(s)).transpose()?;
            let take = select.take.as_ref().map(|t| self.capture(t)).transpose()?;
            self.new_line();
            let clause = self.syntax.format_paging(skip.as_deref(), take.as_deref());
            self.push(&clause);
        }
        Ok(())
    }

    fn write_columns(&mut self, columns: &[ColumnDeclaration]) -> TranslateResult<()> {
        if columns.is_empty() {
            self.push("NULL");
            return Ok(());
        }
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.write_value(&column.expression)?;
            let same_name = column.expression.as_column().is_some_and(|c| c.name == column.name);
            if !self.options.hide_column_aliases && !same_name && !column.name.is_empty() {
                let name = self.quote(&column.name);
                self.push(" AS ");
                self.push(&name);
            }
        }
        Ok(())
    }

    fn write_orders(&mut self, orders: &[OrderExpr]) -> TranslateResult<()> {
        for (i, order) in orders.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.write_value(&order.expression)?;
            if order.order_type == OrderType::Descending {
                self.push(" DESC");
            }
        }
        Ok(())
    }

    fn write_subquery(&mut self, select: &SelectExpr) -> TranslateResult<()> {
        self.push("(");
        self.depth += 1;
        self.new_line();
        let result = self.write_select(select);
        self.depth -= 1;
        result?;
        self.new_line();
        self.push(")");
        Ok(())
    }

    fn write_source(&mut self, source: &Expr) -> TranslateResult<()> {
        match source.as_ref() {
            DbExpr::Table(t) => {
                let (table, alias) = (self.quote(&t.name), self.alias_name(t.alias));
                self.push(&format!("{} AS {}", table, alias));
            }
            DbExpr::Select(s) => {
                self.write_subquery(s)?;
                let alias = self.alias_name(s.alias);
                self.push(&format!(" AS {}", alias));
            }
            DbExpr::Join(j) => {
                self.write_source(&j.left)?;
                let keyword = match j.join_type {
                    JoinType::CrossJoin => ",",
                    JoinType::InnerJoin => "INNER JOIN",
                    JoinType::LeftOuter | JoinType::SingletonLeftOuter => "LEFT OUTER JOIN",
                    JoinType::RightOuter => "RIGHT OUTER JOIN",
                    JoinType::CrossApply | JoinType::OuterApply if !self.syntax.supports_apply() => {
                        return Err(TranslateError::unsupported(format!("APPLY joins on {}", self.syntax.name()), source));
                    }
                    JoinType::CrossApply => "CROSS APPLY",
                    JoinType::OuterApply => "OUTER APPLY",
                };
                self.new_line();
                self.push(keyword);
                self.push(" ");
                self.write_source(&j.right)?;
                let needs_condition = matches!(
                    j.join_type,
                    JoinType::InnerJoin | JoinType::LeftOuter | JoinType::SingletonLeftOuter | JoinType::RightOuter
                );
                match &j.condition {
                    Some(c) if j.join_type != JoinType::CrossJoin => {
                        self.new_line();
                        self.push("ON ");
                        self.write_predicate(c)?;
                    }
                    None if needs_condition => {
                        self.new_line();
                        self.push("ON 1 = 1");
                    }
                    _ => {}
                }
            }
            _ => return Err(TranslateError::unsupported("row source", source)),
        }
        Ok(())
    }

    fn write_command(&mut self, expr: &Expr) -> TranslateResult<()> {
        match expr.as_ref() {
            DbExpr::Insert(insert) => {
                self.name_target(&insert.table);
                let table = self.quote(&insert.table.name);
                let columns: Vec<String> = insert.assignments.iter().map(|a| self.quote(&a.column)).collect();
                self.push(&format!("INSERT INTO {}({})", table, columns.join(", ")));
                self.new_line();
                self.push("VALUES (");
                let values: Vec<Expr> = insert.assignments.iter().map(|a| a.value.clone()).collect();
                self.write_list(&values)?;
                self.push(")");
            }
            DbExpr::Update(update) => {
                self.name_target(&update.table);
                let table = self.quote(&update.table.name);
                self.push(&format!("UPDATE {}", table));
                self.new_line();
                self.push("SET ");
                for (i, a) in update.assignments.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    let column = self.quote(&a.column);
                    self.push(&format!("{} = ", column));
                    self.write_value(&a.value)?;
                }
                self.write_command_where(&update.where_clause)?;
            }
            DbExpr::Delete(delete) => {
                self.name_target(&delete.table);
                let table = self.quote(&delete.table.name);
                self.push(&format!("DELETE FROM {}", table));
                self.write_command_where(&delete.where_clause)?;
            }
            _ => return Err(TranslateError::unsupported("command", expr)),
        }
        Ok(())
    }

    /// DML targets carry no alias: their columns are qualified by the table
    /// name itself.
    fn name_target(&mut self, table: &TableExpr) {
        let name = self.quote(&table.name);
        self.aliases.insert(table.alias, name);
    }

    fn write_command_where(&mut self, where_clause: &Option<Expr>) -> TranslateResult<()> {
        if let Some(w) = where_clause {
            self.new_line();
            self.push("WHERE ");
            self.write_predicate(w)?;
        }
        Ok(())
    }

    /// A condition. Values in this position are compared with zero.
    fn write_predicate(&mut self, expr: &Expr) -> TranslateResult<()> {
        if expr.is_predicate() {
            return self.write_expr(expr);
        }
        match expr.as_literal() {
            Some(Literal::Bool(true)) => self.push("1 = 1"),
            Some(Literal::Bool(false)) => self.push("1 = 0"),
            _ => {
                self.write_expr(expr)?;
                self.push(" <> 0");
            }
        }
        Ok(())
    }

    /// A scalar. Conditions in this position become `CASE WHEN … END`.
    fn write_value(&mut self, expr: &Expr) -> TranslateResult<()> {
        if !expr.is_predicate() {
            return self.write_expr(expr);
        }
        self.push("CASE WHEN ");
        self.write_expr(expr)?;
        self.push(" THEN 1 ELSE 0 END");
        Ok(())
    }

    fn write_literal(&mut self, value: &Literal) {
        let text = match value {
            Literal::Null => "NULL".to_string(),
            Literal::Bool(b) => self.syntax.bool_literal(*b).to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::String(s) => format!("'{}'", s.replace('\'', "''")),
            Literal::DateTime(d) => format!("'{}'", d.format("%Y-%m-%d %H:%M:%S")),
            Literal::Guid(g) => format!("'{}'", g),
            Literal::Bytes(bytes) => {
                let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
                format!("0x{}", hex)
            }
        };
        self.push(&text);
    }

    fn write_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> TranslateResult<()> {
        let null_side = match (left.as_literal(), right.as_literal()) {
            (_, Some(Literal::Null)) => Some(left),
            (Some(Literal::Null), _) => Some(right),
            _ => None,
        };
        if let (Some(operand), BinaryOp::Equal | BinaryOp::NotEqual) = (null_side, op) {
            self.write_value(operand)?;
            self.push(if op == BinaryOp::Equal { " IS NULL" } else { " IS NOT NULL" });
            return Ok(());
        }
        if op.is_logical() {
            self.push("(");
            self.write_predicate(left)?;
            self.push(&format!(" {} ", op.symbol()));
            self.write_predicate(right)?;
            self.push(")");
            return Ok(());
        }
        let symbol = if op == BinaryOp::Concat { self.syntax.concat_operator() } else { op.symbol() };
        let parenthesize = !op.is_comparison();
        if parenthesize {
            self.push("(");
        }
        self.write_value(left)?;
        self.push(&format!(" {} ", symbol));
        self.write_value(right)?;
        if parenthesize {
            self.push(")");
        }
        Ok(())
    }

    fn write_function(&mut self, expr: &Expr, name: &str, args: &[Expr]) -> TranslateResult<()> {
        if name == GENERATED_IDENTITY {
            self.push(self.syntax.generated_identity());
            return Ok(());
        }
        let rendered = args.iter().map(|a| self.capture(a)).collect::<TranslateResult<Vec<_>>>()?;
        let text = match self.syntax.format_function(name, &rendered) {
            Some(text) => text,
            None => match self.functions.get(name) {
                Some(custom) => custom.render(&rendered)?,
                None => return Err(TranslateError::unsupported(format!("function {} on {}", name, self.syntax.name()), expr)),
            },
        };
        self.push(&text);
        Ok(())
    }

    fn write_expr(&mut self, expr: &Expr) -> TranslateResult<()> {
        match expr.as_ref() {
            DbExpr::Literal(l) => self.write_literal(l),
            DbExpr::Variable(v) => self.write_literal(&v.value),
            DbExpr::NamedValue(n) => {
                let value = n.value.as_literal().cloned().unwrap_or(Literal::Null);
                self.parameters
                    .entry(n.name.clone())
                    .or_insert_with(|| QueryParameter { name: n.name.clone(), db_type: n.db_type, value });
                let marker = self.syntax.parameter_marker(&n.name);
                self.push(&marker);
            }
            DbExpr::Column(c) => {
                let column = self.quote(&c.name);
                if self.bare_columns {
                    self.push(&column);
                } else {
                    let alias = self.alias_name(c.alias);
                    self.push(&format!("{}.{}", alias, column));
                }
            }
            DbExpr::SubqueryColumn(c) => {
                let alias = self.alias_name(c.alias);
                self.push(&c.template.replace("{0}", &alias));
            }
            DbExpr::Binary(b) => self.write_binary(b.op, &b.left, &b.right)?,
            DbExpr::Unary(u) => match u.op {
                UnaryOp::Not => {
                    self.push("NOT (");
                    self.write_predicate(&u.operand)?;
                    self.push(")");
                }
                UnaryOp::Negate => {
                    self.push("-");
                    self.write_value(&u.operand)?;
                }
            },
            DbExpr::Conditional(c) => {
                self.push("CASE WHEN ");
                self.write_predicate(&c.test)?;
                self.push(" THEN ");
                self.write_value(&c.if_true)?;
                self.push(" ELSE ");
                self.write_value(&c.if_false)?;
                self.push(" END");
            }
            DbExpr::IsNull(e) => {
                self.write_value(e)?;
                self.push(" IS NULL");
            }
            DbExpr::Between(b) => {
                self.write_value(&b.arg)?;
                self.push(" BETWEEN ");
                self.write_value(&b.lower)?;
                self.push(" AND ");
                self.write_value(&b.upper)?;
            }
            DbExpr::Function(f) => self.write_function(expr, &f.name, &f.args)?,
            DbExpr::RowNumber(orders) => {
                self.push("ROW_NUMBER() OVER(ORDER BY ");
                if orders.is_empty() {
                    self.push("(SELECT 1)");
                } else {
                    self.write_orders(orders)?;
                }
                self.push(")");
            }
            DbExpr::Aggregate(a) => {
                if a.is_distinct && !self.syntax.supports_distinct_in_aggregates() {
                    return Err(TranslateError::unsupported(format!("DISTINCT aggregates on {}", self.syntax.name()), expr));
                }
                self.push(a.kind.sql_name());
                self.push("(");
                if a.is_distinct {
                    self.push("DISTINCT ");
                }
                match &a.argument {
                    Some(arg) => self.write_value(arg)?,
                    None => self.push("*"),
                }
                self.push(")");
            }
            DbExpr::AggregateSubquery(a) => self.write_subquery(&a.aggregate_as_subquery)?,
            DbExpr::Scalar(s) | DbExpr::Select(s) => self.write_subquery(s)?,
            DbExpr::Exists(s) => {
                self.push("EXISTS");
                self.write_subquery(s)?;
            }
            DbExpr::In(i) => match &i.source {
                InSource::Values(values) if values.is_empty() => self.push("1 = 0"),
                InSource::Values(values) => {
                    self.write_value(&i.expr)?;
                    self.push(" IN (");
                    self.write_list(values)?;
                    self.push(")");
                }
                InSource::Select(s) => {
                    self.write_value(&i.expr)?;
                    self.push(" IN ");
                    self.write_subquery(s)?;
                }
            },
            _ => return Err(TranslateError::unsupported("client-side expression in SQL", expr)),
        }
        Ok(())
    }
}

/// Tables read anywhere in a statement, subqueries included.
#[derive(Default)]
struct TableCounter {
    tables: usize,
}

impl TableCounter {
    fn count(select: &SelectExpr) -> usize {
        let mut counter = TableCounter::default();
        counter.visit_select(select);
        counter.tables
    }
}

impl DbVisitor for TableCounter {
    fn visit(&mut self, expr: &Expr) {
        if let DbExpr::Table(_) = expr.as_ref() {
            self.tables += 1;
        }
        walk_visit(self, expr)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        dialect::{AccessSyntax, SqliteSyntax, TSqlSyntax},
        ir::{ColumnAssignment, DeleteCommand},
    };

    fn customers() -> (TableExpr, SelectExpr) {
        let t = TableExpr { alias: TableAlias::new(), name: "Customers".into(), entity: "Customer".into() };
        let columns = vec![
            ColumnDeclaration::new("ID", t.column("ID", DbType::Int)),
            ColumnDeclaration::new("Name", t.column("CompanyName", DbType::String)),
        ];
        let select = SelectExpr::new(TableAlias::new(), columns, Some(Arc::new(DbExpr::Table(t.clone()))), None);
        (t, select)
    }

    fn sql(syntax: &dyn SqlSyntax, options: &TranslateOptions, expr: &Expr) -> String {
        SqlFormatter::new(syntax, &FunctionRegistry::new(), options).format(expr).unwrap().sql
    }

    #[test]
    fn select_with_predicate_and_value_positions() {
        let (t, mut select) = customers();
        select.where_clause = Some(DbExpr::equal(t.column("City", DbType::String), DbExpr::null()));
        select.columns.push(ColumnDeclaration::new("Flag", DbExpr::equal(t.column("ID", DbType::Int), DbExpr::literal(1))));
        let out = sql(&TSqlSyntax::new(), &TranslateOptions::default(), &DbExpr::select(select));
        assert_eq!(
            out,
            "SELECT t0.[ID], t0.[CompanyName] AS [Name], CASE WHEN t0.[ID] = 1 THEN 1 ELSE 0 END AS [Flag]\n\
             FROM [Customers] AS t0\n\
             WHERE t0.[City] IS NULL"
        );
    }

    #[test]
    fn paging_follows_dialect_style() {
        let (t, mut select) = customers();
        select.take = Some(DbExpr::literal(5));
        let top = sql(&AccessSyntax, &TranslateOptions::default(), &DbExpr::select(select.clone()));
        assert!(top.starts_with("SELECT TOP 5 "));

        select.skip = Some(DbExpr::literal(10));
        let offset = sql(&TSqlSyntax::new(), &TranslateOptions::default(), &DbExpr::select(select.clone()));
        assert!(offset.ends_with("ORDER BY (SELECT 1)\nOFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"));

        select.order_by = vec![OrderExpr::new(OrderType::Descending, t.column("ID", DbType::Int))];
        let limit = sql(&SqliteSyntax, &TranslateOptions::default(), &DbExpr::select(select));
        assert!(limit.ends_with("ORDER BY t0.\"ID\" DESC\nLIMIT 5 OFFSET 10"));
    }

    #[test]
    fn commands_qualify_columns_by_table_name() {
        let t = TableExpr { alias: TableAlias::new(), name: "Orders".into(), entity: "Order".into() };
        let delete = Arc::new(DbExpr::Delete(DeleteCommand {
            table: t.clone(),
            where_clause: Some(DbExpr::equal(t.column("ID", DbType::Int), DbExpr::literal(3))),
        }));
        assert_eq!(sql(&TSqlSyntax::new(), &TranslateOptions::default(), &delete), "DELETE FROM [Orders]\nWHERE [Orders].[ID] = 3");

        let insert = Arc::new(DbExpr::Insert(crate::ir::InsertCommand {
            table: t,
            assignments: vec![ColumnAssignment { column: "Total".into(), db_type: DbType::Int, value: DbExpr::literal(9) }],
        }));
        assert_eq!(sql(&TSqlSyntax::new(), &TranslateOptions::default(), &insert), "INSERT INTO [Orders]([Total])\nVALUES (9)");
    }

    #[test]
    fn where_only_and_parameters() {
        let (t, mut select) = customers();
        let p = Arc::new(DbExpr::NamedValue(crate::ir::NamedValue {
            name: "p0".into(),
            value: DbExpr::literal("Berlin"),
            db_type: DbType::String,
        }));
        select.where_clause = Some(DbExpr::and(
            DbExpr::equal(t.column("City", DbType::String), p.clone()),
            DbExpr::binary(BinaryOp::NotEqual, t.column("Country", DbType::String), p),
        ));
        let out = SqlFormatter::new(&TSqlSyntax::new(), &FunctionRegistry::new(), &TranslateOptions::where_clause())
            .format(&DbExpr::select(select))
            .unwrap();
        assert_eq!(out.sql, "([City] = @p0 AND [Country] <> @p0)");
        assert_eq!(out.parameters.len(), 1);
        assert_eq!(out.parameters[0].value, Literal::from("Berlin"));
    }

    #[test]
    fn apply_is_rejected_without_dialect_support() {
        let (_, left) = customers();
        let (_, right) = customers();
        let join = DbExpr::join(JoinType::OuterApply, DbExpr::select(left), DbExpr::select(right), None);
        let select = SelectExpr::new(TableAlias::new(), vec![], Some(join), None);
        let err = SqlFormatter::new(&SqliteSyntax, &FunctionRegistry::new(), &TranslateOptions::default())
            .format(&DbExpr::select(select))
            .unwrap_err();
        assert!(matches!(err, TranslateError::Unsupported { .. }));
    }

    #[test]
    fn hidden_aliases_are_kept_for_joins() {
        let (t, single) = customers();
        let options = TranslateOptions { hide_table_aliases: true, ..TranslateOptions::default() };
        let out = sql(&TSqlSyntax::new(), &options, &DbExpr::select(single));
        assert!(out.starts_with("SELECT [ID], [CompanyName] AS [Name]\n"), "{}", out);

        let o = TableExpr { alias: TableAlias::new(), name: "Orders".into(), entity: "Order".into() };
        let join = DbExpr::join(
            JoinType::InnerJoin,
            Arc::new(DbExpr::Table(t.clone())),
            Arc::new(DbExpr::Table(o.clone())),
            Some(DbExpr::equal(t.column("ID", DbType::Int), o.column("CustomerID", DbType::Int))),
        );
        let columns = vec![ColumnDeclaration::new("Total", o.column("Total", DbType::Float))];
        let joined = SelectExpr::new(TableAlias::new(), columns, Some(join), None);
        let out = sql(&TSqlSyntax::new(), &options, &DbExpr::select(joined));
        assert!(out.starts_with("SELECT t0.[Total]\n"), "{}", out);
        assert!(out.contains("ON t1.[ID] = t0.[CustomerID]"), "{}", out);
    }

    #[test]
    fn root_aggregate_has_no_column_alias() {
        let (_, mut select) = customers();
        select.columns = vec![ColumnDeclaration::new("", Arc::new(DbExpr::Aggregate(crate::ir::AggregateExpr {
            kind: crate::ir::AggregateKind::Count,
            argument: None,
            is_distinct: false,
            db_type: DbType::Int,
        })))];
        let out = sql(&TSqlSyntax::new(), &TranslateOptions::default(), &DbExpr::select(select));
        assert_eq!(out, "SELECT COUNT(*)\nFROM [Customers] AS t0");
    }
}
