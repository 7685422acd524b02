use crate::{
    ir::{walk_children, BinaryExpr, BinaryOp, DbExpr, DbRewriter, EntityExpr, Expr, NewExpr},
    metadata::MetadataProvider,
    translator::{QueryMapping, TranslateError, TranslateResult},
};

/// Expands `==`/`!=` between client shapes into SQL comparisons: entities
/// compare by primary key, records member by member, and an outer-joined
/// value compared with null tests its outer join marker.
pub struct ComparisonRewriter<'a> {
    metadata: &'a dyn MetadataProvider,
}

impl<'a> ComparisonRewriter<'a> {
    pub fn rewrite_tree(metadata: &'a dyn MetadataProvider, expr: &Expr) -> TranslateResult<Expr> {
        ComparisonRewriter { metadata }.rewrite(expr)
    }

    fn is_null(expr: &Expr) -> bool {
        expr.as_literal().is_some_and(|l| l.is_null())
    }

    fn is_shape(expr: &Expr) -> bool {
        matches!(expr.as_ref(), DbExpr::Entity(_) | DbExpr::New(_) | DbExpr::OuterJoined(_))
    }

    fn key_members(&self, entity: &EntityExpr) -> TranslateResult<Vec<String>> {
        let info = QueryMapping::entity_info(self.metadata, &entity.entity)?;
        let keys: Vec<String> = info.primary_keys().into_iter().map(|m| m.name.clone()).collect();
        if keys.is_empty() {
            return Err(TranslateError::NoPrimaryKeyDefined { entity: entity.entity.clone() });
        }
        Ok(keys)
    }

    fn members_equal(&self, left: &Expr, right: &Expr, names: &[String]) -> TranslateResult<Option<Expr>> {
        let mut parts = Vec::with_capacity(names.len());
        for name in names {
            let l = QueryMapping::bind_member(self.metadata, left, name)?;
            let r = QueryMapping::bind_member(self.metadata, right, name)?;
            parts.push(self.equality(&l, &r)?.unwrap_or_else(|| DbExpr::equal(l, r)));
        }
        Ok(DbExpr::conjunction(parts))
    }

    fn record_names(record: &NewExpr) -> Vec<String> {
        let mut names: Vec<String> = record.members.iter().map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    /// Equality of two shapes, or `None` when they are not comparable this
    /// way and the comparison is left as written.
    fn equality(&self, left: &Expr, right: &Expr) -> TranslateResult<Option<Expr>> {
        match (left.as_ref(), right.as_ref()) {
            (DbExpr::OuterJoined(o), _) if Self::is_null(right) => Ok(Some(DbExpr::is_null_test(o.test.clone()))),
            (_, DbExpr::OuterJoined(o)) if Self::is_null(left) => Ok(Some(DbExpr::is_null_test(o.test.clone()))),
            (DbExpr::OuterJoined(o), _) => self.equality(&o.expr, right),
            (_, DbExpr::OuterJoined(o)) => self.equality(left, &o.expr),
            (DbExpr::Entity(e), _) if Self::is_null(right) => self.keys_null(left, e),
            (_, DbExpr::Entity(e)) if Self::is_null(left) => self.keys_null(right, e),
            (DbExpr::Entity(a), DbExpr::Entity(_)) => {
                let keys = self.key_members(a)?;
                self.members_equal(left, right, &keys)
            }
            (DbExpr::New(a), DbExpr::New(b)) => {
                let names = Self::record_names(a);
                if names != Self::record_names(b) {
                    return Ok(None);
                }
                self.members_equal(left, right, &names)
            }
            _ => Ok(None),
        }
    }

    fn keys_null(&self, expr: &Expr, entity: &EntityExpr) -> TranslateResult<Option<Expr>> {
        let mut parts = Vec::new();
        for key in self.key_members(entity)? {
            parts.push(DbExpr::is_null_test(QueryMapping::bind_member(self.metadata, expr, &key)?));
        }
        Ok(DbExpr::conjunction(parts))
    }
}

impl DbRewriter for ComparisonRewriter<'_> {
    fn rewrite_binary(&mut self, expr: &Expr, binary: &BinaryExpr) -> TranslateResult<Expr> {
        let rewritten = walk_children(self, expr)?;
        if !matches!(binary.op, BinaryOp::Equal | BinaryOp::NotEqual) {
            return Ok(rewritten);
        }
        let DbExpr::Binary(b) = rewritten.as_ref() else { return Ok(rewritten) };
        if !Self::is_shape(&b.left) && !Self::is_shape(&b.right) {
            return Ok(rewritten);
        }
        match self.equality(&b.left, &b.right)? {
            Some(eq) if b.op == BinaryOp::NotEqual => Ok(DbExpr::not(eq)),
            Some(eq) => Ok(eq),
            None => Ok(rewritten),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::{
        ir::{DbType, UnaryOp},
        metadata::{EntityInfo, MappingDict},
    };

    fn dict() -> MappingDict {
        MappingDict::new().with(
            EntityInfo::new("OrderLine", "OrderLines")
                .key("OrderID", DbType::Int)
                .key("Line", DbType::Int)
                .column("Qty", DbType::Int),
        )
    }

    fn line(dict: &MappingDict) -> Expr {
        QueryMapping::table_projection(&QueryMapping::entity_info(dict, "OrderLine").unwrap(), false).projector
    }

    #[test]
    fn entity_equality_compares_primary_keys() {
        let dict = dict();
        let cmp = DbExpr::binary(BinaryOp::NotEqual, line(&dict), line(&dict));
        let out = ComparisonRewriter::rewrite_tree(&dict, &cmp).unwrap();
        let DbExpr::Unary(u) = out.as_ref() else { panic!("negation expected") };
        assert_eq!(u.op, UnaryOp::Not);
        assert_eq!(DbExpr::split_conjuncts(&u.operand).len(), 2);
    }

    #[test]
    fn records_with_different_members_are_left_alone() {
        let dict = dict();
        let a = DbExpr::new_record(vec![("x".into(), DbExpr::literal(1))]);
        let b = DbExpr::new_record(vec![("y".into(), DbExpr::literal(1))]);
        let cmp = DbExpr::equal(a, b);
        let out = ComparisonRewriter::rewrite_tree(&dict, &cmp).unwrap();
        assert!(Arc::ptr_eq(&out, &cmp));
    }

    #[test]
    fn outer_joined_against_null_tests_marker() {
        let dict = dict();
        let test = DbExpr::column(crate::ir::TableAlias::new(), "Test", DbType::Int);
        let shaped = DbExpr::outer_joined(test, line(&dict));
        let out = ComparisonRewriter::rewrite_tree(&dict, &DbExpr::equal(shaped, DbExpr::null())).unwrap();
        let DbExpr::IsNull(inner) = out.as_ref() else { panic!("IS NULL expected") };
        assert_eq!(inner.as_column().unwrap().name, "Test");
    }
}
