use std::fmt::{self, Display, Formatter};

use crate::{
    ir::UnaryOp,
    query::QueryExpr,
};

fn list(f: &mut Formatter<'_>, items: &[QueryExpr]) -> fmt::Result {
    for (i, a) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", a)?;
    }
    Ok(())
}

impl Display for QueryExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            QueryExpr::Table { entity } => write!(f, "{}", entity),
            QueryExpr::Constant(l) => write!(f, "{}", l),
            QueryExpr::Variable { name, .. } => write!(f, "{}", name),
            QueryExpr::ValueList(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            QueryExpr::EntityList { entity, rows } => write!(f, "{}[{}]", entity, rows.len()),
            QueryExpr::Row(row) => write!(f, "{}{{..}}", row.entity),
            QueryExpr::Param(p) => write!(f, "{}", p),
            QueryExpr::Lambda { params, body } => {
                if params.len() == 1 {
                    write!(f, "{} => {}", params[0], body)
                } else {
                    write!(f, "(")?;
                    for (i, p) in params.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", p)?;
                    }
                    write!(f, ") => {}", body)
                }
            }
            QueryExpr::Member { expr, name } => write!(f, "{}.{}", expr, name),
            QueryExpr::Binary { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            QueryExpr::Unary { op: UnaryOp::Not, operand } => write!(f, "!{}", operand),
            QueryExpr::Unary { op: UnaryOp::Negate, operand } => write!(f, "-{}", operand),
            QueryExpr::Conditional { test, if_true, if_false } => write!(f, "({} ? {} : {})", test, if_true, if_false),
            QueryExpr::New { members } => {
                write!(f, "new {{ ")?;
                for (i, (n, e)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} = {}", n, e)?;
                }
                write!(f, " }}")
            }
            QueryExpr::Call { op, args } => match args.split_first() {
                Some((source, rest)) => {
                    write!(f, "{}.{}(", source, op)?;
                    list(f, rest)?;
                    write!(f, ")")
                }
                None => write!(f, "{}()", op),
            },
            QueryExpr::Function { name, args } => {
                write!(f, "{}(", name)?;
                list(f, args)?;
                write!(f, ")")
            }
        }
    }
}
