use std::sync::Arc;

use crate::{
    dialect::{FunctionRegistry, SqlSyntax},
    ir::{walk_select, DbExpr, DbRewriter, DbType, SelectExpr},
    metadata::{MetadataProvider, PolicySource},
    translator::{QueryBinder, QueryMapping, TranslateOptions, TranslateResult},
};

/// Restricts every select reading a bare table: soft-deleted rows are
/// hidden and the entity's registered policy predicates are ANDed into
/// the select's `where`.
pub struct PolicyInjector<'a> {
    metadata: &'a dyn MetadataProvider,
    syntax: &'a dyn SqlSyntax,
    functions: &'a FunctionRegistry,
    options: &'a TranslateOptions,
    policies: Option<&'a dyn PolicySource>,
}

impl<'a> PolicyInjector<'a> {
    pub fn new(
        metadata: &'a dyn MetadataProvider,
        syntax: &'a dyn SqlSyntax,
        functions: &'a FunctionRegistry,
        options: &'a TranslateOptions,
        policies: Option<&'a dyn PolicySource>,
    ) -> Self {
        Self { metadata, syntax, functions, options, policies }
    }
}

impl DbRewriter for PolicyInjector<'_> {
    fn rewrite_select(&mut self, select: &Arc<SelectExpr>) -> TranslateResult<Arc<SelectExpr>> {
        let select = walk_select(self, select)?;
        let Some(DbExpr::Table(table)) = select.from.as_deref() else { return Ok(select) };
        let info = QueryMapping::entity_info(self.metadata, &table.entity)?;

        let mut filters = Vec::new();
        if let Some(flag) = &info.soft_delete {
            filters.push(DbExpr::equal(table.column(flag.clone(), DbType::Int), DbExpr::literal(0)));
        }
        if let Some(policies) = self.policies {
            let predicates = policies.predicates_for(&info.name);
            if !predicates.is_empty() {
                let row = QueryMapping::entity_over_table(&info, table);
                let mut binder = QueryBinder::new(self.metadata, self.syntax, self.functions, self.options);
                for predicate in &predicates {
                    filters.push(binder.bind_lambda(predicate, &[row.clone()])?);
                }
            }
        }
        if filters.is_empty() {
            return Ok(select);
        }
        Ok(select.with_where(DbExpr::and_also(select.where_clause.clone(), DbExpr::conjunction(filters))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dialect::TSqlSyntax,
        ir::BinaryOp,
        metadata::{EntityInfo, MappingDict, PolicyTable},
        query::QueryExpr,
    };

    fn dict() -> MappingDict {
        MappingDict::new().with(
            EntityInfo::new("Customer", "Customers")
                .key("ID", DbType::Int)
                .column("TenantID", DbType::Int)
                .soft_delete("IsDeleted"),
        )
    }

    #[test]
    fn soft_delete_and_policy_filters_are_anded_in() {
        let dict = dict();
        let (syntax, functions, options) = (TSqlSyntax::new(), FunctionRegistry::new(), TranslateOptions::default());
        let policies = PolicyTable::new().with("Customer", QueryExpr::lambda(|c| c.m("TenantID").eq(7)));
        let root = QueryMapping::table_projection(&QueryMapping::entity_info(&dict, "Customer").unwrap(), false).into_expr();

        let out = PolicyInjector::new(&dict, &syntax, &functions, &options, Some(&policies)).rewrite(&root).unwrap();
        let where_clause = out.as_projection().unwrap().select.where_clause.clone().unwrap();
        let parts = DbExpr::split_conjuncts(&where_clause);
        assert_eq!(parts.len(), 2);
        let DbExpr::Binary(flag) = parts[0].as_ref() else { panic!("comparison expected") };
        assert_eq!(flag.op, BinaryOp::Equal);
        assert_eq!(flag.left.as_column().unwrap().name, "IsDeleted");
    }

    #[test]
    fn plain_entity_without_policies_is_untouched() {
        let dict = MappingDict::new().with(EntityInfo::new("Tag", "Tags").key("ID", DbType::Int));
        let (syntax, functions, options) = (TSqlSyntax::new(), FunctionRegistry::new(), TranslateOptions::default());
        let root = QueryMapping::table_projection(&QueryMapping::entity_info(&dict, "Tag").unwrap(), false).into_expr();
        let out = PolicyInjector::new(&dict, &syntax, &functions, &options, None).rewrite(&root).unwrap();
        assert!(Arc::ptr_eq(&out, &root));
    }
}
