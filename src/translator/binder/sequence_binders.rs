use std::{mem, sync::Arc};

use crate::{
    ir::{
        AliasGatherer, DbExpr, Expr, GroupingExpr, JoinType, Literal, OrderExpr, OrderType, PagingSpec, ProjectionExpr,
        SelectExpr, TableAlias,
    },
    query::{Operator, QueryExpr},
    translator::{
        binder::{arg, GroupByInfo, QueryBinder},
        ColumnProjector, QueryMapping, TranslateError, TranslateResult,
    },
};

/// Wrap `source` in a new select that re-projects `projector`.
fn wrap(source: &ProjectionExpr, projector: &Expr, existing: &[TableAlias]) -> TranslateResult<(SelectExpr, Expr)> {
    let alias = TableAlias::new();
    let pc = ColumnProjector::project(projector, alias, existing)?;
    let select = SelectExpr::new(alias, pc.columns, Some(DbExpr::from_select(source.select.clone())), None);
    Ok((select, pc.projector))
}

fn projection(select: SelectExpr, projector: Expr, source: &ProjectionExpr) -> Expr {
    ProjectionExpr { select: Arc::new(select), projector, aggregator: None, is_no_tracking: source.is_no_tracking }
        .into_expr()
}

/// Same projection with its select replaced by one sharing its alias.
fn in_place(source: &ProjectionExpr, select: SelectExpr) -> Expr {
    ProjectionExpr { select: Arc::new(select), ..source.clone() }.into_expr()
}

/// Wrap only to get a fresh select layer that keeps the projector shape.
fn rewrap(source: &ProjectionExpr) -> TranslateResult<(SelectExpr, Expr)> {
    wrap(source, &source.projector, &[source.select.alias])
}

pub fn bind_where(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let source = b.bind_sequence(arg(args, 0, Operator::Where)?)?;
    let predicate = b.bind_lambda(arg(args, 1, Operator::Where)?, &[source.projector.clone()])?;
    let (mut select, projector) = rewrap(&source)?;
    select.where_clause = Some(predicate);
    Ok(projection(select, projector, &source))
}

pub fn bind_select(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let source = b.bind_sequence(arg(args, 0, Operator::Select)?)?;
    let selector = b.bind_lambda(arg(args, 1, Operator::Select)?, &[source.projector.clone()])?;
    let (select, projector) = wrap(&source, &selector, &[source.select.alias])?;
    Ok(projection(select, projector, &source))
}

fn strip_default_if_empty(query: &QueryExpr) -> (&QueryExpr, bool) {
    match query {
        QueryExpr::Call { op: Operator::DefaultIfEmpty, args } if args.len() == 1 => (&args[0], true),
        _ => (query, false),
    }
}

pub fn bind_select_many(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let source = b.bind_sequence(arg(args, 0, Operator::SelectMany)?)?;
    let collection = arg(args, 1, Operator::SelectMany)?;
    let (params, body) =
        collection.as_lambda().ok_or_else(|| TranslateError::unsupported("collection selector", collection))?;
    let (body, is_outer) = strip_default_if_empty(body);
    let stripped = QueryExpr::Lambda { params: params.to_vec(), body: Box::new(body.clone()) };
    let bound = b.bind_lambda(&stripped, &[source.projector.clone()])?;
    let mut inner = match bound.as_ref() {
        DbExpr::Projection(p) => p.clone(),
        DbExpr::Grouping(g) => g
            .elements
            .as_projection()
            .cloned()
            .ok_or_else(|| TranslateError::unsupported("collection selector", collection))?,
        DbExpr::Member(m) => QueryMapping::relationship_projection(b.metadata, m, source.is_no_tracking)?.1,
        _ => return Err(TranslateError::unsupported("collection selector", collection)),
    };
    let correlated = AliasGatherer::referenced_in_select(&inner.select).contains(&source.select.alias);
    let join_type = match (is_outer, correlated) {
        (true, _) => JoinType::OuterApply,
        (false, true) => JoinType::CrossApply,
        (false, false) => JoinType::CrossJoin,
    };
    if is_outer {
        inner = QueryMapping::add_outer_join_test(&inner);
    }
    let join = DbExpr::join(
        join_type,
        DbExpr::from_select(source.select.clone()),
        DbExpr::from_select(inner.select.clone()),
        None,
    );
    let result = match args.get(2) {
        Some(result) => b.bind_lambda(result, &[source.projector.clone(), inner.projector.clone()])?,
        None => inner.projector.clone(),
    };
    let alias = TableAlias::new();
    let pc = ColumnProjector::project(&result, alias, &[source.select.alias, inner.select.alias])?;
    let select = SelectExpr::new(alias, pc.columns, Some(join), None);
    Ok(projection(select, pc.projector, &source))
}

pub fn bind_join(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let (outer_q, right_outer) = strip_default_if_empty(arg(args, 0, Operator::Join)?);
    let (inner_q, left_outer) = strip_default_if_empty(arg(args, 1, Operator::Join)?);
    let mut outer = b.bind_sequence(outer_q)?;
    let mut inner = b.bind_sequence(inner_q)?;
    let outer_key = b.bind_lambda(arg(args, 2, Operator::Join)?, &[outer.projector.clone()])?;
    let inner_key = b.bind_lambda(arg(args, 3, Operator::Join)?, &[inner.projector.clone()])?;
    let join_type = match (right_outer, left_outer) {
        (false, false) => JoinType::InnerJoin,
        (false, true) => JoinType::LeftOuter,
        (true, false) => JoinType::RightOuter,
        (true, true) => return Err(TranslateError::unsupported("full outer join", arg(args, 0, Operator::Join)?)),
    };
    if left_outer {
        inner = QueryMapping::add_outer_join_test(&inner);
    }
    if right_outer {
        outer = QueryMapping::add_outer_join_test(&outer);
    }
    let condition = QueryMapping::keys_equal(&outer_key, &inner_key);
    let join = DbExpr::join(
        join_type,
        DbExpr::from_select(outer.select.clone()),
        DbExpr::from_select(inner.select.clone()),
        Some(condition),
    );
    let result = b.bind_lambda(arg(args, 4, Operator::Join)?, &[outer.projector.clone(), inner.projector.clone()])?;
    let alias = TableAlias::new();
    let pc = ColumnProjector::project(&result, alias, &[outer.select.alias, inner.select.alias])?;
    let select = SelectExpr::new(alias, pc.columns, Some(join), None);
    Ok(projection(select, pc.projector, &outer))
}

pub fn bind_group_by(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let source_q = arg(args, 0, Operator::GroupBy)?;
    let key_lambda = arg(args, 1, Operator::GroupBy)?;
    let element_lambda = args.get(2);

    let source = b.bind_sequence(source_q)?;
    let key = b.bind_lambda(key_lambda, &[source.projector.clone()])?;
    let element = match element_lambda {
        Some(l) => b.bind_lambda(l, &[source.projector.clone()])?,
        None => source.projector.clone(),
    };
    let key_pc = ColumnProjector::project(&key, source.select.alias, &[source.select.alias])?;
    let group_exprs: Vec<Expr> = key_pc.columns.iter().map(|c| c.expression.clone()).collect();

    // a second, independent copy of the source is the basis of the element subquery
    let basis = b.bind_sequence(source_q)?;
    let basis_key = b.bind_lambda(key_lambda, &[basis.projector.clone()])?;
    let basis_key_pc = ColumnProjector::project(&basis_key, basis.select.alias, &[basis.select.alias])?;
    let basis_group_exprs: Vec<Expr> = basis_key_pc.columns.iter().map(|c| c.expression.clone()).collect();
    let correlation = QueryMapping::nulls_equal(&basis_group_exprs, &group_exprs);
    let basis_element = match element_lambda {
        Some(l) => b.bind_lambda(l, &[basis.projector.clone()])?,
        None => basis.projector.clone(),
    };
    let element_alias = TableAlias::new();
    let element_pc = ColumnProjector::project(&basis_element, element_alias, &[basis.select.alias])?;
    let element_select =
        SelectExpr::new(element_alias, element_pc.columns, Some(DbExpr::from_select(basis.select.clone())), correlation);
    let element_subquery = ProjectionExpr {
        select: Arc::new(element_select),
        projector: element_pc.projector,
        aggregator: None,
        is_no_tracking: basis.is_no_tracking,
    }
    .into_expr();

    let alias = TableAlias::new();
    let grouping = Arc::new(DbExpr::Grouping(GroupingExpr { key, elements: element_subquery }));
    let pc = ColumnProjector::project(&grouping, alias, &[source.select.alias])?;
    if let DbExpr::Grouping(g) = pc.projector.as_ref() {
        b.group_by_map.insert(
            Arc::as_ptr(&g.elements),
            GroupByInfo { alias, element, _elements: g.elements.clone() },
        );
    }
    let mut select = SelectExpr::new(alias, pc.columns, Some(DbExpr::from_select(source.select.clone())), None);
    select.group_by = group_exprs;
    Ok(projection(select, pc.projector, &source))
}

pub fn bind_order_by(b: &mut QueryBinder<'_>, args: &[QueryExpr], op: Operator) -> TranslateResult<Expr> {
    let then_bys = mem::take(&mut b.then_bys);
    let source = b.bind_sequence(arg(args, 0, op)?)?;
    let first_type = if op == Operator::OrderByDescending { OrderType::Descending } else { OrderType::Ascending };
    let mut orders = vec![OrderExpr::new(first_type, b.bind_lambda(arg(args, 1, op)?, &[source.projector.clone()])?)];
    for (descending, key) in then_bys.iter().rev() {
        let order_type = if *descending { OrderType::Descending } else { OrderType::Ascending };
        orders.push(OrderExpr::new(order_type, b.bind_lambda(key, &[source.projector.clone()])?));
    }
    let (mut select, projector) = rewrap(&source)?;
    select.order_by = orders;
    Ok(projection(select, projector, &source))
}

pub fn bind_order_asc(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    bind_order_by(b, args, Operator::OrderBy)
}

pub fn bind_order_desc(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    bind_order_by(b, args, Operator::OrderByDescending)
}

fn bind_then_by(b: &mut QueryBinder<'_>, args: &[QueryExpr], descending: bool) -> TranslateResult<Expr> {
    let source = arg(args, 0, Operator::ThenBy)?;
    let ordered = [Operator::OrderBy, Operator::OrderByDescending, Operator::ThenBy, Operator::ThenByDescending]
        .iter()
        .any(|op| source.is_call(*op));
    if !ordered {
        return Err(TranslateError::unsupported("ThenBy without OrderBy", source));
    }
    b.then_bys.push((descending, arg(args, 1, Operator::ThenBy)?.clone()));
    b.bind_expr(source)
}

pub fn bind_then_asc(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    bind_then_by(b, args, false)
}

pub fn bind_then_desc(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    bind_then_by(b, args, true)
}

pub fn bind_distinct(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let source = b.bind_sequence(arg(args, 0, Operator::Distinct)?)?;
    let (mut select, projector) = rewrap(&source)?;
    select.is_distinct = true;
    Ok(projection(select, projector, &source))
}

fn bind_count_arg(b: &mut QueryBinder<'_>, query: &QueryExpr) -> TranslateResult<Expr> {
    let bound = b.bind_expr(query)?;
    match bound.as_ref() {
        DbExpr::Literal(Literal::Int(_)) | DbExpr::Variable(_) => Ok(bound),
        _ => Err(TranslateError::unsupported("paging count", query)),
    }
}

pub fn bind_take(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let source = b.bind_sequence(arg(args, 0, Operator::Take)?)?;
    let take = bind_count_arg(b, arg(args, 1, Operator::Take)?)?;
    if source.select.take.is_none() && source.select.segment.is_none() {
        let select = SelectExpr { take: Some(take), ..(*source.select).clone() };
        return Ok(in_place(&source, select));
    }
    let (mut select, projector) = rewrap(&source)?;
    select.take = Some(take);
    Ok(projection(select, projector, &source))
}

pub fn bind_skip(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let source_q = arg(args, 0, Operator::Skip)?;
    let skip = bind_count_arg(b, arg(args, 1, Operator::Skip)?)?;
    let (source_expr, source) = b.bind_source(source_q)?;
    if skip.as_literal() == Some(&Literal::Int(0)) {
        return Ok(source_expr);
    }
    if source.select.skip.is_none() && source.select.take.is_none() && source.select.segment.is_none() {
        let select = SelectExpr { skip: Some(skip), ..(*source.select).clone() };
        return Ok(in_place(&source, select));
    }
    let (mut select, projector) = rewrap(&source)?;
    select.skip = Some(skip);
    Ok(projection(select, projector, &source))
}

pub fn bind_reverse(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let source = b.bind_sequence(arg(args, 0, Operator::Reverse)?)?;
    if source.select.take.is_none() && source.select.skip.is_none() {
        let select = SelectExpr { is_reverse: !source.select.is_reverse, ..(*source.select).clone() };
        return Ok(in_place(&source, select));
    }
    let (mut select, projector) = rewrap(&source)?;
    select.is_reverse = true;
    Ok(projection(select, projector, &source))
}

pub fn bind_default_if_empty(_b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    Err(TranslateError::unsupported("DefaultIfEmpty outside a join", arg(args, 0, Operator::DefaultIfEmpty)?))
}

pub fn bind_segment(b: &mut QueryBinder<'_>, args: &[QueryExpr], is_root: bool) -> TranslateResult<Expr> {
    let source = b.bind_sequence(arg(args, 0, Operator::Segment)?)?;
    let read = |i: usize| match arg(args, i, Operator::Segment) {
        Ok(QueryExpr::Constant(Literal::Int(n))) => Ok(*n),
        Ok(other) => Err(TranslateError::unsupported("segment bound", other)),
        Err(e) => Err(e),
    };
    let segment = PagingSpec { page: read(1)?, size: read(2)? };
    if !is_root {
        return Err(TranslateError::unsupported("nested Segment", arg(args, 0, Operator::Segment)?));
    }
    let select = SelectExpr { segment: Some(segment), ..(*source.select).clone() };
    Ok(in_place(&source, select))
}
