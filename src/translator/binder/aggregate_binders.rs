use std::sync::Arc;

use crate::{
    ir::{
        AggregateKind, AggregateSubqueryExpr, Aggregator, BinaryOp, ColumnDeclaration, DbExpr, DbType, Expr, InExpr,
        InSource, Literal, ProjectionExpr, SelectExpr, TableAlias,
    },
    query::{Operator, QueryExpr},
    translator::{
        binder::{arg, QueryBinder},
        ColumnProjector, QueryMapping, TranslateError, TranslateResult,
    },
};

/// A one-row select without a source holding `expr` as column `value`.
fn singleton(expr: Expr, aggregator: Aggregator) -> Expr {
    let alias = TableAlias::new();
    let db_type = expr.db_type();
    let select = SelectExpr::new(alias, vec![ColumnDeclaration::new("value", expr)], None, None);
    DbExpr::projection(Arc::new(select), DbExpr::column(alias, "value", db_type), Some(aggregator))
}

fn bind_aggregate(b: &mut QueryBinder<'_>, args: &[QueryExpr], is_root: bool, op: Operator) -> TranslateResult<Expr> {
    let kind = AggregateKind::from_name(op.name()).ok_or_else(|| TranslateError::UnknownAggregateKind(op.name().into()))?;
    let has_predicate_arg = kind.has_predicate_arg();
    let mut source_q = arg(args, 0, op)?.clone();
    let mut argument = args.get(1).cloned();
    let mut is_distinct = false;
    let mut argument_was_predicate = false;

    if !has_predicate_arg && argument.is_none() && b.syntax.supports_distinct_in_aggregates() {
        if let QueryExpr::Call { op: Operator::Distinct, args: inner } = &source_q {
            if let [inner] = inner.as_slice() {
                source_q = inner.clone();
                is_distinct = true;
            }
        }
    }
    if has_predicate_arg {
        if let Some(predicate) = argument.take() {
            source_q = QueryExpr::Call { op: Operator::Where, args: vec![source_q, predicate] };
            argument_was_predicate = true;
        }
    }

    let (source_expr, source) = b.bind_source(&source_q)?;
    let arg_expr = match &argument {
        Some(selector) => Some(b.bind_lambda(selector, &[source.projector.clone()])?),
        None if !has_predicate_arg => Some(source.projector.clone()),
        None => None,
    };
    let alias = TableAlias::new();
    let aggregate = DbExpr::aggregate(kind, arg_expr, is_distinct);
    let db_type = aggregate.db_type();
    let select = SelectExpr::new(
        alias,
        vec![ColumnDeclaration::new("", aggregate)],
        Some(DbExpr::from_select(source.select.clone())),
        None,
    );
    if is_root {
        return Ok(DbExpr::projection(Arc::new(select), DbExpr::column(alias, "", db_type), Some(Aggregator::Scalar)));
    }
    let subquery = Arc::new(select);
    if argument_was_predicate {
        return Ok(Arc::new(DbExpr::Scalar(subquery)));
    }
    let Some(info) = b.group_info(&source_expr).cloned() else {
        return Ok(Arc::new(DbExpr::Scalar(subquery)));
    };
    // rebind against the ungrouped element so the aggregate is legal in the group select
    let grouped_arg = match &argument {
        Some(selector) => Some(b.bind_lambda(selector, &[info.element.clone()])?),
        None if !has_predicate_arg => Some(info.element.clone()),
        None => None,
    };
    Ok(Arc::new(DbExpr::AggregateSubquery(AggregateSubqueryExpr {
        group_by_alias: info.alias,
        aggregate_in_group_select: DbExpr::aggregate(kind, grouped_arg, is_distinct),
        aggregate_as_subquery: subquery,
    })))
}

pub fn bind_count(b: &mut QueryBinder<'_>, args: &[QueryExpr], is_root: bool) -> TranslateResult<Expr> {
    bind_aggregate(b, args, is_root, Operator::Count)
}

pub fn bind_sum(b: &mut QueryBinder<'_>, args: &[QueryExpr], is_root: bool) -> TranslateResult<Expr> {
    bind_aggregate(b, args, is_root, Operator::Sum)
}

pub fn bind_min(b: &mut QueryBinder<'_>, args: &[QueryExpr], is_root: bool) -> TranslateResult<Expr> {
    bind_aggregate(b, args, is_root, Operator::Min)
}

pub fn bind_max(b: &mut QueryBinder<'_>, args: &[QueryExpr], is_root: bool) -> TranslateResult<Expr> {
    bind_aggregate(b, args, is_root, Operator::Max)
}

pub fn bind_average(b: &mut QueryBinder<'_>, args: &[QueryExpr], is_root: bool) -> TranslateResult<Expr> {
    bind_aggregate(b, args, is_root, Operator::Average)
}

fn bind_first(b: &mut QueryBinder<'_>, args: &[QueryExpr], op: Operator) -> TranslateResult<Expr> {
    let source = b.bind_sequence(arg(args, 0, op)?)?;
    let where_clause = match args.get(1) {
        Some(predicate) => Some(b.bind_lambda(predicate, &[source.projector.clone()])?),
        None => None,
    };
    let (take, is_last, aggregator) = match op {
        Operator::First => (true, false, Aggregator::First),
        Operator::FirstOrDefault => (true, false, Aggregator::FirstOrDefault),
        Operator::Last => (true, true, Aggregator::First),
        Operator::LastOrDefault => (true, true, Aggregator::FirstOrDefault),
        Operator::Single => (false, false, Aggregator::Single),
        _ => (false, false, Aggregator::SingleOrDefault),
    };
    let alias = TableAlias::new();
    let pc = ColumnProjector::project(&source.projector, alias, &[source.select.alias])?;
    let mut select = SelectExpr::new(alias, pc.columns, Some(DbExpr::from_select(source.select.clone())), where_clause);
    if take {
        select.take = Some(DbExpr::literal(1));
    }
    select.is_reverse = is_last;
    Ok(ProjectionExpr {
        select: Arc::new(select),
        projector: pc.projector,
        aggregator: Some(aggregator),
        is_no_tracking: source.is_no_tracking,
    }
    .into_expr())
}

pub fn bind_first_op(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    bind_first(b, args, Operator::First)
}

pub fn bind_first_or_default(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    bind_first(b, args, Operator::FirstOrDefault)
}

pub fn bind_last(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    bind_first(b, args, Operator::Last)
}

pub fn bind_last_or_default(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    bind_first(b, args, Operator::LastOrDefault)
}

pub fn bind_single(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    bind_first(b, args, Operator::Single)
}

pub fn bind_single_or_default(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    bind_first(b, args, Operator::SingleOrDefault)
}

fn bind_any_all(b: &mut QueryBinder<'_>, args: &[QueryExpr], is_root: bool, is_all: bool) -> TranslateResult<Expr> {
    let op = if is_all { Operator::All } else { Operator::Any };
    let source_q = arg(args, 0, op)?;
    let predicate = args.get(1);
    if is_all && predicate.is_none() {
        return Err(TranslateError::invalid("All requires a predicate"));
    }

    if let QueryExpr::ValueList(values) = source_q {
        let mut parts = Vec::with_capacity(values.len());
        for value in values {
            let element = DbExpr::literal(value.clone());
            parts.push(match predicate {
                Some(p) => b.bind_lambda(p, &[element])?,
                None => DbExpr::literal(true),
            });
        }
        let combine = if is_all { DbExpr::and } else { DbExpr::or };
        let result = parts.into_iter().reduce(combine).unwrap_or_else(|| DbExpr::literal(is_all));
        return Ok(if is_root { singleton(result, Aggregator::SingleOrDefault) } else { result });
    }

    let filtered = match predicate {
        Some(p) => {
            let p = if is_all { negate_lambda(p)? } else { p.clone() };
            QueryExpr::Call { op: Operator::Where, args: vec![source_q.clone(), p] }
        }
        None => source_q.clone(),
    };
    let source = b.bind_sequence(&filtered)?;
    let exists = Arc::new(DbExpr::Exists(source.select.clone()));
    let result = if is_all { DbExpr::not(exists) } else { exists };
    if !is_root {
        return Ok(result);
    }
    if b.syntax.supports_subquery_in_select_without_from() {
        return Ok(singleton(result, Aggregator::SingleOrDefault));
    }
    let count = DbExpr::aggregate(AggregateKind::Count, None, false);
    let select = source.select.with_columns(vec![ColumnDeclaration::new("value", count)]);
    let value = DbExpr::column(select.alias, "value", DbType::Int);
    let test = if is_all {
        DbExpr::equal(value, DbExpr::literal(0))
    } else {
        DbExpr::binary(BinaryOp::GreaterThan, value, DbExpr::literal(0))
    };
    Ok(DbExpr::projection(select, test, Some(Aggregator::Scalar)))
}

fn negate_lambda(lambda: &QueryExpr) -> TranslateResult<QueryExpr> {
    let (params, body) = lambda.as_lambda().ok_or_else(|| TranslateError::unsupported("predicate", lambda))?;
    Ok(QueryExpr::Lambda { params: params.to_vec(), body: Box::new(body.clone().not()) })
}

pub fn bind_any(b: &mut QueryBinder<'_>, args: &[QueryExpr], is_root: bool) -> TranslateResult<Expr> {
    bind_any_all(b, args, is_root, false)
}

pub fn bind_all(b: &mut QueryBinder<'_>, args: &[QueryExpr], is_root: bool) -> TranslateResult<Expr> {
    bind_any_all(b, args, is_root, true)
}

pub fn bind_contains(b: &mut QueryBinder<'_>, args: &[QueryExpr], is_root: bool) -> TranslateResult<Expr> {
    let source_q = arg(args, 0, Operator::Contains)?;
    let value_q = arg(args, 1, Operator::Contains)?;
    match source_q {
        QueryExpr::ValueList(values) => {
            let value = b.bind_expr(value_q)?;
            if values.is_empty() {
                return Ok(DbExpr::equal(DbExpr::literal(1), DbExpr::literal(0)));
            }
            let values = values.iter().cloned().map(DbExpr::literal).collect();
            Ok(Arc::new(DbExpr::In(InExpr { expr: value, source: InSource::Values(values) })))
        }
        QueryExpr::EntityList { entity, rows } => {
            let info = QueryMapping::entity_info(b.metadata, entity)?;
            let keys = info.primary_keys();
            if keys.is_empty() {
                return Err(TranslateError::NoPrimaryKeyDefined { entity: entity.clone() });
            }
            let value = b.bind_expr(value_q)?;
            let mut parts = Vec::with_capacity(keys.len());
            for key in keys {
                let member = QueryMapping::bind_member(b.metadata, &value, &key.name)?;
                let values = rows.iter().map(|r| DbExpr::literal(r.get(&key.name).cloned().unwrap_or(Literal::Null))).collect();
                parts.push(Arc::new(DbExpr::In(InExpr { expr: member, source: InSource::Values(values) })));
            }
            Ok(DbExpr::conjunction(parts).unwrap_or_else(|| DbExpr::literal(false)))
        }
        _ if is_root && !b.syntax.supports_subquery_in_select_without_from() => {
            let value = value_q.clone();
            let any = [source_q.clone(), QueryExpr::lambda(|x| x.eq(value))];
            bind_any_all(b, &any, true, false)
        }
        _ => {
            let source = b.bind_sequence(source_q)?;
            if source.select.columns.len() != 1 {
                return Err(TranslateError::unsupported("Contains over a multi-column sequence", source_q));
            }
            let value = b.bind_expr(value_q)?;
            let result = Arc::new(DbExpr::In(InExpr { expr: value, source: InSource::Select(source.select.clone()) }));
            Ok(if is_root { singleton(result, Aggregator::SingleOrDefault) } else { result })
        }
    }
}
