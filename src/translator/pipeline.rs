use std::sync::Arc;

use tracing::debug;

use crate::{
    dialect::{FunctionRegistry, PagingStrategy, SqlSyntax},
    ir::{DbExpr, DbRewriter, Expr},
    metadata::{MetadataProvider, PolicySource},
    translator::{
        rewriters::{
            AggregateRewriter, ClientJoinedProjectionRewriter, ComparisonRewriter, CrossApplyRewriter, CrossJoinIsolator,
            CrossJoinRewriter, NestedTopPager, OrderByRewriter, PolicyInjector, RedundantColumnRemover,
            RedundantJoinRemover, RedundantSubqueryRemover, RelationshipBinder, RelationshipIncluder, RowNumberPager,
            SingletonProjectionRewriter, UnusedColumnRemover,
        },
        TranslateOptions, TranslateResult,
    },
};

/// The fixed rewrite schedule run between binding and parameterization.
pub struct QueryPipeline<'a> {
    metadata: &'a dyn MetadataProvider,
    syntax: &'a dyn SqlSyntax,
    functions: &'a FunctionRegistry,
    options: &'a TranslateOptions,
    policies: Option<&'a dyn PolicySource>,
}

impl<'a> QueryPipeline<'a> {
    pub fn new(
        metadata: &'a dyn MetadataProvider,
        syntax: &'a dyn SqlSyntax,
        functions: &'a FunctionRegistry,
        options: &'a TranslateOptions,
        policies: Option<&'a dyn PolicySource>,
    ) -> Self {
        Self { metadata, syntax, functions, options, policies }
    }

    /// Optimize a bound tree. Each command of a block is optimized on its own.
    pub fn optimize(&self, expr: &Expr) -> TranslateResult<Expr> {
        let DbExpr::Block(commands) = expr.as_ref() else { return self.optimize_one(expr) };
        let mut changed = false;
        let mut optimized = Vec::with_capacity(commands.len());
        for command in commands {
            let out = self.optimize_one(command)?;
            changed |= !Arc::ptr_eq(&out, command);
            optimized.push(out);
        }
        if !changed {
            return Ok(expr.clone());
        }
        Ok(Arc::new(DbExpr::Block(optimized)))
    }

    fn optimize_one(&self, expr: &Expr) -> TranslateResult<Expr> {
        // Group aggregates are resolved before any select is spliced out
        // from under a group.
        let e = AggregateRewriter::rewrite_tree(expr)?;
        let mut e = Self::cleanup(&e)?;

        e = Self::pass("includes", e, |x| RelationshipIncluder::include(self.metadata, x), true)?;
        e = Self::pass("relationships", e, |x| RelationshipBinder::bind(self.metadata, self.options.no_tracking, x), true)?;
        e = Self::pass("comparisons", e, |x| ComparisonRewriter::rewrite_tree(self.metadata, x), true)?;
        e = Self::pass(
            "policies",
            e,
            |x| PolicyInjector::new(self.metadata, self.syntax, self.functions, self.options, self.policies).rewrite(x),
            true,
        )?;

        e = Self::pass("singletons", e, |x| SingletonProjectionRewriter::rewrite_tree(x, self.syntax.supports_apply()), true)?;
        if self.options.allow_client_joins {
            e = Self::pass("client joins", e, ClientJoinedProjectionRewriter::rewrite_tree, true)?;
        }

        e = Self::pass("order by", e, OrderByRewriter::rewrite_tree, true)?;
        e = Self::pass("cross apply", e, CrossApplyRewriter::rewrite_tree, true)?;
        e = Self::pass("cross joins", e, CrossJoinRewriter::rewrite_tree, true)?;

        match self.syntax.paging_strategy() {
            PagingStrategy::OffsetFetch => {}
            PagingStrategy::RowNumber => {
                e = Self::pass("row number paging", e, RowNumberPager::rewrite_tree, true)?;
                e = Self::pass("order by", e, OrderByRewriter::rewrite_tree, true)?;
            }
            PagingStrategy::NestedTop => {
                e = Self::pass("nested top paging", e, NestedTopPager::rewrite_tree, true)?;
            }
        }
        // Isolation wraps selects that cleanup would splice out again, so
        // the tail runs without it.
        e = Self::pass("redundant subqueries", e, RedundantSubqueryRemover::remove, false)?;
        Self::pass("cross join isolation", e, CrossJoinIsolator::isolate, false)
    }

    /// Run one pass, logging it when it changed the tree and following it
    /// with the cleanup passes when `cleanup` is set.
    fn pass(
        name: &'static str,
        expr: Expr,
        rewrite: impl FnOnce(&Expr) -> TranslateResult<Expr>,
        cleanup: bool,
    ) -> TranslateResult<Expr> {
        let out = rewrite(&expr)?;
        if Arc::ptr_eq(&out, &expr) {
            return Ok(out);
        }
        debug!(pass = name, "rewrite changed the tree");
        if cleanup { Self::cleanup(&out) } else { Ok(out) }
    }

    /// Dead column, duplicate column, pass-through select and duplicate
    /// join removal.
    pub fn cleanup(expr: &Expr) -> TranslateResult<Expr> {
        let e = UnusedColumnRemover::remove(expr)?;
        let e = RedundantColumnRemover::remove(&e)?;
        let e = RedundantSubqueryRemover::remove(&e)?;
        RedundantJoinRemover::remove(&e)
    }
}
