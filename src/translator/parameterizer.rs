use std::{collections::HashMap, sync::Arc};

use crate::{
    ir::{walk_children, walk_expr, BinaryOp, DbExpr, DbRewriter, DbType, Expr, Literal, NamedValue, UnaryOp, Variable},
    translator::{structural_hash, DbComparer, TranslateResult},
};

/// Folds sub-expressions whose leaves are all literals or external
/// variables. A fold over a variable stays a variable so it is still sent
/// as a parameter.
pub struct PartialEvaluator;

impl PartialEvaluator {
    pub fn fold(expr: &Expr) -> TranslateResult<Expr> {
        PartialEvaluator.rewrite(expr)
    }

    /// The constant value of a leaf, and whether it came from a variable.
    fn constant(expr: &Expr) -> Option<(&Literal, bool)> {
        match expr.as_ref() {
            DbExpr::Literal(l) => Some((l, false)),
            DbExpr::Variable(v) => Some((&v.value, true)),
            _ => None,
        }
    }

    fn numeric(op: BinaryOp, a: &Literal, b: &Literal) -> Option<Literal> {
        if let (Literal::Int(x), Literal::Int(y)) = (a, b) {
            let (x, y) = (*x, *y);
            return match op {
                BinaryOp::Add => x.checked_add(y).map(Literal::Int),
                BinaryOp::Subtract => x.checked_sub(y).map(Literal::Int),
                BinaryOp::Multiply => x.checked_mul(y).map(Literal::Int),
                BinaryOp::Divide => x.checked_div(y).map(Literal::Int),
                BinaryOp::Modulo => x.checked_rem(y).map(Literal::Int),
                _ => None,
            };
        }
        let (x, y) = (a.as_f64()?, b.as_f64()?);
        match op {
            BinaryOp::Add => Some(Literal::float(x + y)),
            BinaryOp::Subtract => Some(Literal::float(x - y)),
            BinaryOp::Multiply => Some(Literal::float(x * y)),
            BinaryOp::Divide if y != 0.0 => Some(Literal::float(x / y)),
            _ => None,
        }
    }

    fn compare(op: BinaryOp, a: &Literal, b: &Literal) -> Option<Literal> {
        let ordering = match (a, b) {
            (Literal::String(x), Literal::String(y)) => x.cmp(y),
            (Literal::Bool(x), Literal::Bool(y)) => x.cmp(y),
            (Literal::DateTime(x), Literal::DateTime(y)) => x.cmp(y),
            (Literal::Guid(x), Literal::Guid(y)) if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) => x.cmp(y),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?)?,
        };
        let result = match op {
            BinaryOp::Equal => ordering.is_eq(),
            BinaryOp::NotEqual => ordering.is_ne(),
            BinaryOp::LessThan => ordering.is_lt(),
            BinaryOp::LessThanOrEqual => ordering.is_le(),
            BinaryOp::GreaterThan => ordering.is_gt(),
            BinaryOp::GreaterThanOrEqual => ordering.is_ge(),
            _ => return None,
        };
        Some(Literal::Bool(result))
    }

    fn binary(op: BinaryOp, a: &Literal, b: &Literal) -> Option<Literal> {
        if a.is_null() || b.is_null() {
            return None;
        }
        match op {
            BinaryOp::Concat => Some(Literal::String(format!("{}{}", a.as_str()?, b.as_str()?))),
            BinaryOp::Add if a.as_str().is_some() && b.as_str().is_some() => {
                Some(Literal::String(format!("{}{}", a.as_str()?, b.as_str()?)))
            }
            BinaryOp::And | BinaryOp::Or => match (a, b) {
                (Literal::Bool(x), Literal::Bool(y)) => Some(Literal::Bool(if op == BinaryOp::And { *x && *y } else { *x || *y })),
                _ => None,
            },
            op if op.is_arithmetic() => Self::numeric(op, a, b),
            op if op.is_comparison() => Self::compare(op, a, b),
            _ => None,
        }
    }

    fn function(name: &str, args: &[&Literal]) -> Option<Literal> {
        match (name, args) {
            ("upper", [a]) => Some(Literal::String(a.as_str()?.to_uppercase())),
            ("lower", [a]) => Some(Literal::String(a.as_str()?.to_lowercase())),
            ("trim", [a]) => Some(Literal::String(a.as_str()?.trim().to_string())),
            ("length", [a]) => Some(Literal::Int(a.as_str()?.chars().count() as i64)),
            ("concat", [_, _, ..]) => {
                let mut out = String::new();
                for a in args {
                    out.push_str(a.as_str()?);
                }
                Some(Literal::String(out))
            }
            _ => None,
        }
    }

    fn folded(original: &Expr, value: Literal, from_variable: bool) -> Expr {
        if from_variable {
            Arc::new(DbExpr::Variable(Variable { name: original.to_string(), value }))
        } else {
            DbExpr::literal(value)
        }
    }
}

impl DbRewriter for PartialEvaluator {
    fn rewrite(&mut self, expr: &Expr) -> TranslateResult<Expr> {
        if !matches!(expr.as_ref(), DbExpr::Binary(_) | DbExpr::Unary(_) | DbExpr::Function(_)) {
            return walk_expr(self, expr);
        }
        let rewritten = walk_children(self, expr)?;
        let folded = match rewritten.as_ref() {
            DbExpr::Binary(b) => match (Self::constant(&b.left), Self::constant(&b.right)) {
                (Some((x, vx)), Some((y, vy))) => Self::binary(b.op, x, y).map(|v| (v, vx || vy)),
                _ => None,
            },
            DbExpr::Unary(u) => match (u.op, Self::constant(&u.operand)) {
                (UnaryOp::Not, Some((Literal::Bool(x), v))) => Some((Literal::Bool(!x), v)),
                (UnaryOp::Negate, Some((Literal::Int(x), v))) => x.checked_neg().map(|n| (Literal::Int(n), v)),
                (UnaryOp::Negate, Some((Literal::Float(x), v))) => Some((Literal::float(-x.into_inner()), v)),
                _ => None,
            },
            DbExpr::Function(f) => {
                let constants: Option<Vec<(&Literal, bool)>> = f.args.iter().map(Self::constant).collect();
                constants.and_then(|c| {
                    let from_variable = c.iter().any(|(_, v)| *v);
                    let values: Vec<&Literal> = c.into_iter().map(|(l, _)| l).collect();
                    Self::function(&f.name, &values).map(|v| (v, from_variable))
                })
            }
            _ => None,
        };
        Ok(match folded {
            Some((value, from_variable)) => Self::folded(expr, value, from_variable),
            None => rewritten,
        })
    }
}

/// Replaces non-inline literals and external variables by named
/// parameters `p0`, `p1`, … Equal literals of one type share a parameter;
/// variables share one when they compare structurally equal.
pub struct Parameterizer {
    inline: bool,
    literals: HashMap<(DbType, Literal), Expr>,
    variables: HashMap<u64, Vec<(Expr, Expr)>>,
    count: usize,
}

impl Parameterizer {
    /// Fold constants, then parameterize. With `inline` set every value is
    /// written into the SQL text instead.
    pub fn parameterize(expr: &Expr, inline: bool) -> TranslateResult<Expr> {
        let folded = PartialEvaluator::fold(expr)?;
        Parameterizer { inline, literals: HashMap::new(), variables: HashMap::new(), count: 0 }.rewrite(&folded)
    }

    fn next_name(&mut self) -> String {
        let name = format!("p{}", self.count);
        self.count += 1;
        name
    }

    fn named(name: String, value: &Literal) -> Expr {
        let db_type = DbType::of_literal(value);
        Arc::new(DbExpr::NamedValue(NamedValue { name, value: DbExpr::literal(value.clone()), db_type }))
    }

    fn literal(&mut self, expr: &Expr, value: &Literal) -> Expr {
        if self.inline || value.is_inline() {
            return expr.clone();
        }
        let key = (DbType::of_literal(value), value.clone());
        if let Some(existing) = self.literals.get(&key) {
            return existing.clone();
        }
        let named = Self::named(self.next_name(), value);
        self.literals.insert(key, named.clone());
        named
    }

    fn variable(&mut self, expr: &Expr, value: &Literal) -> Expr {
        if self.inline || value.is_null() {
            return DbExpr::literal(value.clone());
        }
        let hash = structural_hash(expr);
        if let Some((_, named)) =
            self.variables.get(&hash).and_then(|seen| seen.iter().find(|(e, _)| DbComparer::are_equal(e, expr)))
        {
            return named.clone();
        }
        let named = Self::named(self.next_name(), value);
        self.variables.entry(hash).or_default().push((expr.clone(), named.clone()));
        named
    }
}

impl DbRewriter for Parameterizer {
    fn rewrite(&mut self, expr: &Expr) -> TranslateResult<Expr> {
        match expr.as_ref() {
            DbExpr::Literal(l) => Ok(self.literal(expr, l)),
            DbExpr::Variable(v) => Ok(self.variable(expr, &v.value)),
            DbExpr::NamedValue(_) => Ok(expr.clone()),
            _ => walk_expr(self, expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ColumnExpr, TableAlias};

    fn var(name: &str, value: impl Into<Literal>) -> Expr {
        Arc::new(DbExpr::Variable(Variable { name: name.into(), value: value.into() }))
    }

    fn parameter_name(expr: &Expr) -> Option<String> {
        match expr.as_ref() {
            DbExpr::NamedValue(n) => Some(n.name.clone()),
            DbExpr::Binary(b) => parameter_name(&b.right),
            _ => None,
        }
    }

    fn names(expr: &Expr) -> Vec<String> {
        let DbExpr::Binary(b) = expr.as_ref() else { panic!("binary expected") };
        parameter_name(&b.left).into_iter().chain(parameter_name(&b.right)).collect()
    }

    #[test]
    fn equal_string_literals_share_one_parameter() {
        let a = TableAlias::new();
        let col = |n: &str| Arc::new(DbExpr::Column(ColumnExpr { alias: a, name: n.into(), db_type: DbType::String }));
        let p = DbExpr::or(DbExpr::equal(col("x"), DbExpr::literal("abc")), DbExpr::equal(col("y"), DbExpr::literal("abc")));
        let out = Parameterizer::parameterize(&p, false).unwrap();
        assert_eq!(names(&out), vec!["p0".to_string(), "p0".to_string()]);
    }

    #[test]
    fn numbers_stay_inline_and_inline_mode_keeps_strings() {
        let p = DbExpr::equal(DbExpr::column(TableAlias::new(), "n", DbType::Int), DbExpr::literal(5));
        assert!(Arc::ptr_eq(&Parameterizer::parameterize(&p, false).unwrap(), &p));
        let s = DbExpr::equal(DbExpr::column(TableAlias::new(), "s", DbType::String), var("city", "Paris"));
        let out = Parameterizer::parameterize(&s, true).unwrap();
        let DbExpr::Binary(b) = out.as_ref() else { panic!("binary expected") };
        assert_eq!(b.right.as_literal(), Some(&Literal::from("Paris")));
    }

    #[test]
    fn constant_subtrees_fold() {
        let sum = DbExpr::binary(BinaryOp::Add, DbExpr::literal(2), DbExpr::literal(3));
        assert_eq!(PartialEvaluator::fold(&sum).unwrap().as_literal(), Some(&Literal::Int(5)));
        let upper = DbExpr::function("upper", vec![var("name", "ann")], DbType::String);
        let DbExpr::Variable(v) = PartialEvaluator::fold(&upper).unwrap().as_ref().clone() else { panic!("variable expected") };
        assert_eq!(v.value, Literal::from("ANN"));
        let cmp = DbExpr::binary(BinaryOp::LessThan, DbExpr::literal(1.5), DbExpr::literal(2));
        assert_eq!(PartialEvaluator::fold(&cmp).unwrap().as_literal(), Some(&Literal::Bool(true)));
    }
}
