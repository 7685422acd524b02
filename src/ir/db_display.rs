use std::fmt::{self, Display, Formatter};

use crate::ir::{DbExpr, InSource, OrderExpr, OrderType, SelectExpr, UnaryOp};

fn join_list<T: Display>(f: &mut Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl Display for OrderExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.order_type {
            OrderType::Ascending => write!(f, "{}", self.expression),
            OrderType::Descending => write!(f, "{} DESC", self.expression),
        }
    }
}

impl Display for SelectExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "(SELECT ")?;
        if self.is_distinct {
            write!(f, "DISTINCT ")?;
        }
        for (i, c) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} AS {}", c.expression, c.name)?;
        }
        if let Some(from) = &self.from {
            write!(f, " FROM {}", from)?;
        }
        if let Some(w) = &self.where_clause {
            write!(f, " WHERE {}", w)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " GROUP BY ")?;
            join_list(f, &self.group_by, ", ")?;
        }
        if let Some(h) = &self.having {
            write!(f, " HAVING {}", h)?;
        }
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            join_list(f, &self.order_by, ", ")?;
        }
        if let Some(s) = &self.skip {
            write!(f, " SKIP {}", s)?;
        }
        if let Some(t) = &self.take {
            write!(f, " TAKE {}", t)?;
        }
        if self.is_reverse {
            write!(f, " REVERSE")?;
        }
        write!(f, ") {}", self.alias)
    }
}

impl Display for DbExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DbExpr::Literal(l) => write!(f, "{}", l),
            DbExpr::Variable(v) => write!(f, "@{}", v.name),
            DbExpr::NamedValue(n) => write!(f, "@{}", n.name),
            DbExpr::Column(c) => write!(f, "{}.{}", c.alias, c.name),
            DbExpr::SubqueryColumn(c) => write!(f, "{}.{}*", c.alias, c.name),
            DbExpr::Binary(b) => write!(f, "({} {} {})", b.left, b.op.symbol(), b.right),
            DbExpr::Unary(u) => match u.op {
                UnaryOp::Not => write!(f, "NOT {}", u.operand),
                UnaryOp::Negate => write!(f, "-{}", u.operand),
            },
            DbExpr::Conditional(c) => write!(f, "IIF({}, {}, {})", c.test, c.if_true, c.if_false),
            DbExpr::IsNull(e) => write!(f, "{} IS NULL", e),
            DbExpr::Between(b) => write!(f, "{} BETWEEN {} AND {}", b.arg, b.lower, b.upper),
            DbExpr::Function(func) => {
                write!(f, "{}(", func.name)?;
                join_list(f, &func.args, ", ")?;
                write!(f, ")")
            }
            DbExpr::RowNumber(orders) => {
                write!(f, "ROW_NUMBER() OVER(ORDER BY ")?;
                join_list(f, orders, ", ")?;
                write!(f, ")")
            }
            DbExpr::Aggregate(a) => {
                write!(f, "{}(", a.kind.sql_name())?;
                if a.is_distinct {
                    write!(f, "DISTINCT ")?;
                }
                match &a.argument {
                    Some(arg) => write!(f, "{})", arg),
                    None => write!(f, "*)"),
                }
            }
            DbExpr::AggregateSubquery(a) => write!(f, "GROUPAGG[{}]({})", a.group_by_alias, a.aggregate_in_group_select),
            DbExpr::Scalar(s) => write!(f, "SCALAR{}", s),
            DbExpr::Exists(s) => write!(f, "EXISTS{}", s),
            DbExpr::In(i) => match &i.source {
                InSource::Select(s) => write!(f, "{} IN {}", i.expr, s),
                InSource::Values(values) => {
                    write!(f, "{} IN (", i.expr)?;
                    join_list(f, values, ", ")?;
                    write!(f, ")")
                }
            },
            DbExpr::Table(t) => write!(f, "{} {}", t.name, t.alias),
            DbExpr::Select(s) => write!(f, "{}", s),
            DbExpr::Join(j) => {
                write!(f, "{} {:?} {}", j.left, j.join_type, j.right)?;
                match &j.condition {
                    Some(c) => write!(f, " ON {}", c),
                    None => Ok(()),
                }
            }
            DbExpr::Projection(p) => {
                write!(f, "PROJECT {} => {}", p.select, p.projector)?;
                match p.aggregator {
                    Some(a) => write!(f, " |> {:?}", a),
                    None => Ok(()),
                }
            }
            DbExpr::ClientJoin(c) => {
                write!(f, "CLIENTJOIN[")?;
                join_list(f, &c.outer_key, ", ")?;
                write!(f, " = ")?;
                join_list(f, &c.inner_key, ", ")?;
                write!(f, "] {}", c.projection.clone().into_expr())
            }
            DbExpr::OuterJoined(o) => write!(f, "OUTERJOINED({}, {})", o.test, o.expr),
            DbExpr::New(n) => {
                write!(f, "new {{ ")?;
                for (i, (name, e)) in n.members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", name, e)?;
                }
                write!(f, " }}")
            }
            DbExpr::Entity(e) => write!(f, "{}{}", e.entity, e.init),
            DbExpr::Member(m) => write!(f, "{}.{}", m.expr, m.member),
            DbExpr::Grouping(g) => write!(f, "GROUPING({}, {})", g.key, g.elements),
            DbExpr::Insert(i) => {
                write!(f, "INSERT {} (", i.table.name)?;
                for (n, a) in i.assignments.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", a.column, a.value)?;
                }
                write!(f, ")")
            }
            DbExpr::Update(u) => {
                write!(f, "UPDATE {} SET ", u.table.name)?;
                for (n, a) in u.assignments.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", a.column, a.value)?;
                }
                match &u.where_clause {
                    Some(w) => write!(f, " WHERE {}", w),
                    None => Ok(()),
                }
            }
            DbExpr::Delete(d) => {
                write!(f, "DELETE {}", d.table.name)?;
                match &d.where_clause {
                    Some(w) => write!(f, " WHERE {}", w),
                    None => Ok(()),
                }
            }
            DbExpr::Block(commands) => join_list(f, commands, "; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::ir::{AggregateKind, ColumnDeclaration, DbExpr, DbType, SelectExpr, TableAlias, TableExpr};

    #[test]
    fn renders_readable_select() {
        let t = TableAlias::new();
        let s = TableAlias::new();
        let table = Arc::new(DbExpr::Table(TableExpr { alias: t, name: "Orders".into(), entity: "Order".into() }));
        let mut sel = SelectExpr::new(
            s,
            vec![ColumnDeclaration::new("n", DbExpr::aggregate(AggregateKind::Count, None, false))],
            Some(table),
            Some(DbExpr::equal(DbExpr::column(t, "Region", DbType::String), DbExpr::literal("EU"))),
        );
        sel.group_by.push(DbExpr::column(t, "Region", DbType::String));
        let text = DbExpr::select(sel).to_string();
        assert_eq!(
            text,
            format!("(SELECT COUNT(*) AS n FROM Orders {t} WHERE ({t}.Region = \"EU\") GROUP BY {t}.Region) {s}")
        );
    }
}
