use std::sync::Arc;

use crate::{
    ir::{
        Aggregator, ColumnAssignment, ColumnDeclaration, ColumnMapper, DbExpr, DeleteCommand, Expr, InsertCommand,
        Literal, ProjectionExpr, SelectExpr, TableAlias, TableExpr, UpdateCommand, Variable,
    },
    metadata::{EntityInfo, MemberInfo},
    query::{EntityRow, Operator, QueryExpr},
    translator::{
        binder::{arg, QueryBinder},
        QueryMapping, TranslateError, TranslateResult,
    },
};

/// Name of the function the formatter renders as the dialect's
/// last-generated-identity expression.
pub const GENERATED_IDENTITY: &str = "generated_identity";

fn variable(name: &str, value: Literal) -> Expr {
    Arc::new(DbExpr::Variable(Variable { name: name.to_string(), value }))
}

fn target(b: &QueryBinder<'_>, table: &QueryExpr, op: Operator) -> TranslateResult<(Arc<EntityInfo>, TableExpr)> {
    let QueryExpr::Table { entity } = table else {
        return Err(TranslateError::unsupported(format!("{} target", op), table));
    };
    let info = QueryMapping::entity_info(b.metadata, entity)?;
    let table = fresh_table(&info);
    Ok((info, table))
}

fn row_arg<'q>(args: &'q [QueryExpr], op: Operator) -> TranslateResult<&'q EntityRow> {
    match arg(args, 1, op)? {
        QueryExpr::Row(row) => Ok(row),
        other => Err(TranslateError::unsupported(format!("{} argument", op), other)),
    }
}

fn assignment(m: &MemberInfo, value: &Literal) -> ColumnAssignment {
    ColumnAssignment { column: m.column.clone(), db_type: m.ty, value: variable(&m.name, value.clone()) }
}

fn required<'r>(row: &'r EntityRow, member: &str) -> TranslateResult<&'r Literal> {
    row.get(member)
        .ok_or_else(|| TranslateError::invalid(format!("{} row has no value for key member {}", row.entity, member)))
}

/// `key = @key AND ...` over the primary key, plus original-value checks of
/// concurrency members.
fn identity_predicate(info: &EntityInfo, table: &TableExpr, row: &EntityRow) -> TranslateResult<Expr> {
    let keys = info.primary_keys();
    if keys.is_empty() {
        return Err(TranslateError::NoPrimaryKeyDefined { entity: info.name.clone() });
    }
    let mut parts = Vec::new();
    for key in keys {
        let value = required(row, &key.name)?;
        parts.push(DbExpr::equal(table.column(key.column.clone(), key.ty), variable(&key.name, value.clone())));
    }
    for m in info.concurrency_members() {
        let original = row.original.as_ref().and_then(|o| o.get(&m.name)).or_else(|| row.get(&m.name));
        let Some(original) = original else { continue };
        let name = format!("{}_original", m.name);
        let column = table.column(m.column.clone(), m.ty);
        parts.push(match original {
            Literal::Null => DbExpr::is_null_test(column),
            value => DbExpr::equal(column, variable(&name, value.clone())),
        });
    }
    DbExpr::conjunction(parts).ok_or_else(|| TranslateError::NoPrimaryKeyDefined { entity: info.name.clone() })
}

fn block(mut commands: Vec<Expr>) -> Expr {
    if commands.len() == 1 {
        commands.remove(0)
    } else {
        Arc::new(DbExpr::Block(commands))
    }
}

fn insert_row(
    b: &QueryBinder<'_>,
    info: &EntityInfo,
    row: &EntityRow,
    generated: &[(String, Expr)],
    commands: &mut Vec<Expr>,
) -> TranslateResult<()> {
    let table = fresh_table(info);
    let assignments = info
        .members
        .values()
        .filter(|m| !m.is_generated())
        .filter_map(|m| match generated.iter().find(|(name, _)| *name == m.name) {
            Some((_, value)) => Some(ColumnAssignment { column: m.column.clone(), db_type: m.ty, value: value.clone() }),
            None => row.get(&m.name).map(|v| assignment(m, v)),
        })
        .collect::<Vec<_>>();
    if assignments.is_empty() {
        return Err(TranslateError::invalid(format!("{} row has no values to insert", info.name)));
    }
    commands.push(Arc::new(DbExpr::Insert(InsertCommand { table, assignments })));
    let inserted_at = commands.len();

    let identity = info.members.values().find(|m| m.is_generated());
    if let Some(id) = identity {
        let alias = TableAlias::new();
        let generated = DbExpr::function(GENERATED_IDENTITY, vec![], id.ty);
        let select = SelectExpr::new(alias, vec![ColumnDeclaration::new(id.name.clone(), generated)], None, None);
        let projector = DbExpr::column(alias, id.name.clone(), id.ty);
        commands.push(ProjectionExpr::new(Arc::new(select), projector, Some(Aggregator::Single)).into_expr());
    }

    for relationship in info.relationships.values().filter(|r| r.cascade) {
        let Some(children) = row.children.get(&relationship.member) else { continue };
        let child_info = QueryMapping::entity_info(b.metadata, &relationship.related_entity)?;
        for child in children {
            let mut child = child.clone();
            let mut child_generated = Vec::new();
            for (this_key, other_key) in relationship.this_keys.iter().zip(&relationship.other_keys) {
                if let Some(value) = row.get(this_key) {
                    child.values.insert(other_key.clone(), value.clone());
                    continue;
                }
                // A key the parent's insert generated is read back in place.
                let id = identity.filter(|id| id.name == *this_key).ok_or_else(|| {
                    TranslateError::invalid(format!(
                        "cascading insert of {}.{} needs a value for {}",
                        info.name, relationship.member, this_key
                    ))
                })?;
                if !identity_still_current(b, &commands[inserted_at..])? {
                    return Err(TranslateError::invalid(format!(
                        "cascading insert of {}.{} cannot read the generated {} after another insert moved it",
                        info.name, relationship.member, this_key
                    )));
                }
                child_generated.push((other_key.clone(), DbExpr::function(GENERATED_IDENTITY, vec![], id.ty)));
            }
            insert_row(b, &child_info, &child, &child_generated, commands)?;
        }
    }
    Ok(())
}

/// Whether the generated-key expression still yields the key of the insert
/// that preceded `since`.
fn identity_still_current(b: &QueryBinder<'_>, since: &[Expr]) -> TranslateResult<bool> {
    for command in since {
        let DbExpr::Insert(insert) = command.as_ref() else { continue };
        if b.syntax.identity_follows_every_insert() {
            return Ok(false);
        }
        let info = QueryMapping::entity_info(b.metadata, &insert.table.entity)?;
        if info.members.values().any(|m| m.is_generated()) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn update_row(
    b: &mut QueryBinder<'_>,
    info: &EntityInfo,
    table: TableExpr,
    row: &EntityRow,
    check: Option<&QueryExpr>,
) -> TranslateResult<Expr> {
    let mut where_clause = identity_predicate(info, &table, row)?;
    if let Some(check) = check {
        let entity = QueryMapping::entity_over_table(info, &table);
        where_clause = DbExpr::and(where_clause, b.bind_lambda(check, &[entity])?);
    }
    let assignments = info
        .members
        .values()
        .filter(|m| !m.is_primary_key())
        .filter_map(|m| row.get(&m.name).map(|v| assignment(m, v)))
        .collect::<Vec<_>>();
    if assignments.is_empty() {
        return Err(TranslateError::invalid(format!("{} row has no values to update", info.name)));
    }
    Ok(Arc::new(DbExpr::Update(UpdateCommand { table, where_clause: Some(where_clause), assignments })))
}

fn fresh_table(info: &EntityInfo) -> TableExpr {
    TableExpr { alias: TableAlias::new(), name: info.table.clone(), entity: info.name.clone() }
}

/// Deletes of rows related through cascading relationships to the `info`
/// rows that `filter` (over `table`) matches, deepest level first.
fn cascade_deletes(
    b: &QueryBinder<'_>,
    info: &EntityInfo,
    table: &TableExpr,
    filter: &Expr,
    commands: &mut Vec<Expr>,
) -> TranslateResult<()> {
    for relationship in info.relationships.values().filter(|r| r.cascade) {
        let child_info = QueryMapping::entity_info(b.metadata, &relationship.related_entity)?;
        let child_table = fresh_table(&child_info);
        let parent_table = fresh_table(info);
        let mut parts = vec![ColumnMapper::map(filter, parent_table.alias, [table.alias])?];
        for (this_key, other_key) in relationship.this_keys.iter().zip(&relationship.other_keys) {
            let this = info.member(this_key).ok_or_else(|| TranslateError::UnknownMember {
                entity: info.name.clone(),
                member: this_key.clone(),
            })?;
            let other = child_info.member(other_key).ok_or_else(|| TranslateError::UnknownMember {
                entity: child_info.name.clone(),
                member: other_key.clone(),
            })?;
            parts.push(DbExpr::equal(
                parent_table.column(this.column.clone(), this.ty),
                child_table.column(other.column.clone(), other.ty),
            ));
        }
        let parents = SelectExpr::new(
            TableAlias::new(),
            vec![ColumnDeclaration::new("value", DbExpr::literal(1))],
            Some(Arc::new(DbExpr::Table(parent_table))),
            DbExpr::conjunction(parts),
        );
        let child_filter = Arc::new(DbExpr::Exists(Arc::new(parents)));
        cascade_deletes(b, &child_info, &child_table, &child_filter, commands)?;
        commands.push(Arc::new(DbExpr::Delete(DeleteCommand { table: child_table, where_clause: Some(child_filter) })));
    }
    Ok(())
}

fn delete_where(b: &QueryBinder<'_>, info: &EntityInfo, table: TableExpr, where_clause: Expr) -> TranslateResult<Expr> {
    let mut commands = Vec::new();
    cascade_deletes(b, info, &table, &where_clause, &mut commands)?;
    commands.push(Arc::new(DbExpr::Delete(DeleteCommand { table, where_clause: Some(where_clause) })));
    Ok(block(commands))
}

pub fn bind_insert(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let (info, _) = target(b, arg(args, 0, Operator::Insert)?, Operator::Insert)?;
    let row = row_arg(args, Operator::Insert)?;
    let mut commands = Vec::new();
    insert_row(b, &info, row, &[], &mut commands)?;
    Ok(block(commands))
}

pub fn bind_update(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let (info, table) = target(b, arg(args, 0, Operator::Update)?, Operator::Update)?;
    let row = row_arg(args, Operator::Update)?;
    update_row(b, &info, table, row, args.get(2))
}

pub fn bind_delete(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let (info, table) = target(b, arg(args, 0, Operator::Delete)?, Operator::Delete)?;
    let where_clause = match arg(args, 1, Operator::Delete)? {
        QueryExpr::Row(row) => identity_predicate(&info, &table, row)?,
        predicate @ QueryExpr::Lambda { .. } => {
            let entity = QueryMapping::entity_over_table(&info, &table);
            b.bind_lambda(predicate, &[entity])?
        }
        other => return Err(TranslateError::unsupported("Delete argument", other)),
    };
    delete_where(b, &info, table, where_clause)
}

pub fn bind_batch(b: &mut QueryBinder<'_>, args: &[QueryExpr], _is_root: bool) -> TranslateResult<Expr> {
    let table = arg(args, 0, Operator::Batch)?;
    let QueryExpr::EntityList { rows, .. } = arg(args, 1, Operator::Batch)? else {
        return Err(TranslateError::unsupported("Batch rows", arg(args, 1, Operator::Batch)?));
    };
    let op = match arg(args, 2, Operator::Batch)? {
        QueryExpr::Constant(Literal::String(name)) if name == Operator::Insert.name() => Operator::Insert,
        QueryExpr::Constant(Literal::String(name)) if name == Operator::Update.name() => Operator::Update,
        QueryExpr::Constant(Literal::String(name)) if name == Operator::Delete.name() => Operator::Delete,
        other => return Err(TranslateError::unsupported("Batch operation", other)),
    };
    let mut commands = Vec::with_capacity(rows.len());
    for row in rows {
        let row_args = [table.clone(), QueryExpr::Row(row.clone())];
        let bound = match op {
            Operator::Insert => bind_insert(b, &row_args, false)?,
            Operator::Update => bind_update(b, &row_args, false)?,
            _ => bind_delete(b, &row_args, false)?,
        };
        match bound.as_ref() {
            DbExpr::Block(inner) => commands.extend(inner.iter().cloned()),
            _ => commands.push(bound),
        }
    }
    Ok(Arc::new(DbExpr::Block(commands)))
}
