//! The bind phase: schema attachment, name resolution, type inference.
//!
//! Walks the logical plan bottom-up. Read nodes get a `RelationSchema`
//! (consulting the blob connector for dataset-backed relations, with each
//! reference minting fresh identities so self-joins stay distinct);
//! identifiers resolve to identities; computed columns get fresh
//! identities; every node's output schema is derived from its inputs.
//!
//! After binding, every identifier inside an expression references an
//! identity present in its operator's input schema.

use std::sync::Arc;

use crate::cache::KeyValueStore;
use crate::catalogue::{new_identity, Catalogue, RelationSchema, SchemaColumn};
use crate::errors::{EngineError, Result};
use crate::expression::{
    aggregations, functions, BinaryOp, ColumnBinding, Expression, ExpressionKind, NodeType,
};
use crate::logical_planner::{DatasetFunction, JoinType, LogicalPlan};
use crate::morsel::{DataType, Datum};

pub struct BindContext {
    pub cache: Option<Arc<dyn KeyValueStore>>,
}

impl BindContext {
    pub fn new(cache: Option<Arc<dyn KeyValueStore>>) -> Self {
        Self { cache }
    }
}

pub fn bind(plan: LogicalPlan, ctx: &BindContext) -> Result<LogicalPlan> {
    bind_plan(plan, ctx)
}

fn bind_plan(plan: LogicalPlan, ctx: &BindContext) -> Result<LogicalPlan> {
    match plan {
        LogicalPlan::Read(node) => bind_read(node, ctx),
        LogicalPlan::FunctionDataset(node) => bind_function_dataset(node),
        LogicalPlan::Filter(node) => bind_filter(node, ctx),
        LogicalPlan::Project(node) => bind_project(node, ctx),
        LogicalPlan::Aggregate(node) => bind_aggregate(node, ctx),
        LogicalPlan::AggregateAndGroup(node) => bind_aggregate_and_group(node, ctx),
        LogicalPlan::Join(node) => bind_join(node, ctx),
        LogicalPlan::Sort(node) => bind_sort(node, ctx),
        LogicalPlan::Limit(mut node) => {
            node.input = Box::new(bind_plan(*node.input, ctx)?);
            Ok(LogicalPlan::Limit(node))
        }
        LogicalPlan::Distinct(node) => bind_distinct(node, ctx),
        LogicalPlan::Union(node) => bind_union(node, ctx),
        LogicalPlan::Explain(mut node) => {
            node.inner = Box::new(bind_plan(*node.inner, ctx)?);
            Ok(LogicalPlan::Explain(node))
        }
        LogicalPlan::ShowColumns(mut node) => {
            node.schema = Some(resolve_relation_schema(&node.relation, ctx)?);
            Ok(LogicalPlan::ShowColumns(node))
        }
        LogicalPlan::ShowCreate(mut node) => {
            node.schema = Some(resolve_relation_schema(&node.relation, ctx)?);
            Ok(LogicalPlan::ShowCreate(node))
        }
        passthrough @ (LogicalPlan::ShowVariables
        | LogicalPlan::ShowFunctions
        | LogicalPlan::ShowDatabases) => Ok(passthrough),
    }
}

// ---------------------------------------------------------------------------
// relations

/// Schema for a named relation: catalogue first (samples are registered at
/// init), then the blob connector, registering what it finds.
fn resolve_relation_schema(relation: &str, ctx: &BindContext) -> Result<RelationSchema> {
    let catalogue = Catalogue::global();
    if let Some(schema) = catalogue.schema(relation) {
        return Ok(schema);
    }
    let schema = crate::connectors::dataset_schema(relation, ctx.cache.clone())?;
    catalogue.register(relation, schema.clone(), None, "disk");
    Ok(schema)
}

fn bind_read(
    mut node: crate::logical_planner::Read,
    ctx: &BindContext,
) -> Result<LogicalPlan> {
    match node.subplan.take() {
        Some(subplan) => {
            // CTE or derived table: keep the sub-plan's identities, re-badge
            // the columns with the read alias
            let bound = bind_plan(*subplan, ctx)?;
            let inner_schema = bound.schema().cloned().ok_or_else(|| {
                EngineError::Internal("sub-plan bound without a schema".to_string())
            })?;
            let columns = inner_schema
                .columns
                .iter()
                .map(|column| SchemaColumn {
                    identity: column.identity.clone(),
                    name: column.name.clone(),
                    query_column: column.query_column.clone(),
                    data_type: column.data_type,
                    relation: Some(node.alias.clone()),
                    aliases: column.aliases.clone(),
                })
                .collect();
            node.schema = Some(RelationSchema::new(node.relation.clone(), columns));
            node.subplan = Some(Box::new(bound));
            Ok(LogicalPlan::Read(node))
        }
        None => {
            let schema = resolve_relation_schema(&node.relation, ctx)?;
            node.schema = Some(schema.instantiate(&node.alias));
            Ok(LogicalPlan::Read(node))
        }
    }
}

fn bind_function_dataset(
    mut node: crate::logical_planner::FunctionDataset,
) -> Result<LogicalPlan> {
    let empty = RelationSchema::new(&node.alias, Vec::new());
    let mut bound_args = Vec::with_capacity(node.args.len());
    for arg in std::mem::take(&mut node.args) {
        bound_args.push(bind_expression(arg, &empty, &[], false)?);
    }
    node.args = bound_args;

    let columns: Vec<SchemaColumn> = match node.function {
        DatasetFunction::GenerateSeries => {
            if node.args.len() < 2 || node.args.len() > 3 {
                return Err(EngineError::Sql(
                    "GENERATE_SERIES expects 2 or 3 arguments".to_string(),
                ));
            }
            vec![dataset_column(&node.columns[0], DataType::Integer, &node.alias)]
        }
        DatasetFunction::Unnest => {
            if node.args.len() != 1 {
                return Err(EngineError::Sql(
                    "UNNEST expects a single list argument".to_string(),
                ));
            }
            let element_type = match &node.args[0].kind {
                ExpressionKind::Literal(Datum::List(items)) => items
                    .iter()
                    .find(|item| !item.is_null())
                    .map(|item| item.data_type())
                    .unwrap_or(DataType::Null),
                _ => DataType::Null,
            };
            vec![dataset_column(&node.columns[0], element_type, &node.alias)]
        }
        DatasetFunction::Fake => {
            let (rows, columns) = fake_arguments(&node.args)?;
            let _ = rows;
            node.columns = (0..columns).map(|i| format!("column_{i}")).collect();
            node.columns
                .iter()
                .map(|name| dataset_column(name, DataType::Integer, &node.alias))
                .collect()
        }
        DatasetFunction::Values => {
            let first_row = node.rows.first().ok_or_else(|| {
                EngineError::Sql("VALUES requires at least one row".to_string())
            })?;
            if node.columns.len() != first_row.len() {
                return Err(EngineError::Sql(format!(
                    "VALUES rows have {} columns, {} names given",
                    first_row.len(),
                    node.columns.len()
                )));
            }
            let mut bound_rows = Vec::with_capacity(node.rows.len());
            for row in std::mem::take(&mut node.rows) {
                let mut bound_row = Vec::with_capacity(row.len());
                for expr in row {
                    bound_row.push(bind_expression(expr, &empty, &[], false)?);
                }
                bound_rows.push(bound_row);
            }
            node.rows = bound_rows;
            let mut columns = Vec::with_capacity(node.columns.len());
            for (i, name) in node.columns.iter().enumerate() {
                let data_type = node
                    .rows
                    .iter()
                    .map(|row| infer_type(&row[i]))
                    .find(|t| *t != DataType::Null)
                    .unwrap_or(DataType::Null);
                columns.push(dataset_column(name, data_type, &node.alias));
            }
            columns
        }
    };

    node.schema = Some(RelationSchema::new(node.alias.clone(), columns));
    Ok(LogicalPlan::FunctionDataset(node))
}

fn dataset_column(name: &str, data_type: DataType, relation: &str) -> SchemaColumn {
    let mut column = SchemaColumn::new(name, data_type);
    column.relation = Some(relation.to_string());
    column
}

pub fn fake_arguments(args: &[Expression]) -> Result<(usize, usize)> {
    let counts: Vec<usize> = args
        .iter()
        .map(|arg| match &arg.kind {
            ExpressionKind::Literal(Datum::Integer(n)) if *n >= 0 => Ok(*n as usize),
            _ => Err(EngineError::Sql(
                "FAKE expects two non-negative integer arguments".to_string(),
            )),
        })
        .collect::<Result<_>>()?;
    match counts.as_slice() {
        [rows, columns] => Ok((*rows, *columns)),
        _ => Err(EngineError::Sql(
            "FAKE expects two non-negative integer arguments".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// relational operators

fn bind_filter(node: crate::logical_planner::Filter, ctx: &BindContext) -> Result<LogicalPlan> {
    let input = bind_plan(*node.input, ctx)?;
    let schema = input_schema(&input)?;
    let aggregates = exposed_aggregates(&input);
    let predicate = bind_expression(node.predicate, &schema, &aggregates, false)?;
    let predicate_type = infer_type(&predicate);
    if predicate_type != DataType::Boolean && predicate_type != DataType::Null {
        return Err(EngineError::TypeMismatch(format!(
            "filter predicate must be BOOLEAN, got {predicate_type}"
        )));
    }
    Ok(LogicalPlan::Filter(crate::logical_planner::Filter {
        predicate,
        input: Box::new(input),
    }))
}

fn bind_project(node: crate::logical_planner::Project, ctx: &BindContext) -> Result<LogicalPlan> {
    let input = bind_plan(*node.input, ctx)?;
    let schema = input_schema(&input)?;
    let aggregates = exposed_aggregates(&input);

    let expanded = expand_wildcards(node.columns, &schema)?;
    let mut columns = Vec::with_capacity(expanded.len());
    for column in expanded {
        columns.push(bind_expression(column, &schema, &aggregates, true)?);
    }

    let output = RelationSchema::new(
        "projection",
        columns.iter().filter_map(schema_column_of).collect(),
    );

    Ok(LogicalPlan::Project(crate::logical_planner::Project {
        columns,
        input: Box::new(input),
        schema: Some(output),
    }))
}

fn bind_aggregate(
    mut node: crate::logical_planner::Aggregate,
    ctx: &BindContext,
) -> Result<LogicalPlan> {
    let input = bind_plan(*node.input, ctx)?;
    let schema = input_schema(&input)?;
    node.aggregates = bind_aggregate_expressions(node.aggregates, &schema)?;
    node.schema = Some(RelationSchema::new(
        "aggregate",
        node.aggregates
            .iter()
            .filter_map(schema_column_of)
            .collect(),
    ));
    node.input = Box::new(input);
    Ok(LogicalPlan::Aggregate(node))
}

fn bind_aggregate_and_group(
    mut node: crate::logical_planner::AggregateAndGroup,
    ctx: &BindContext,
) -> Result<LogicalPlan> {
    let input = bind_plan(*node.input, ctx)?;
    let schema = input_schema(&input)?;

    // positional GROUP BY: `GROUP BY 2` resolves to the projection column
    let mut groups = Vec::with_capacity(node.groups.len());
    for group in std::mem::take(&mut node.groups) {
        match &group.kind {
            ExpressionKind::Literal(Datum::Integer(position)) => {
                let index = *position as usize;
                if index == 0 || index > node.projection.len() {
                    return Err(EngineError::Sql(format!(
                        "GROUP BY position {position} is out of range"
                    )));
                }
                let hint = node.projection[index - 1].clone();
                if hint.node_type() == NodeType::Wildcard {
                    return Err(EngineError::Sql(
                        "GROUP BY position cannot reference a wildcard".to_string(),
                    ));
                }
                groups.push(hint);
            }
            _ => groups.push(group),
        }
    }
    node.groups = groups
        .into_iter()
        .map(|group| bind_expression(group, &schema, &[], true))
        .collect::<Result<_>>()?;

    node.aggregates = bind_aggregate_expressions(node.aggregates, &schema)?;

    let mut columns: Vec<SchemaColumn> = Vec::new();
    for group in &node.groups {
        // identifier groups pass the input column through unchanged, so
        // qualified references above the aggregation still resolve
        let passthrough = group
            .identity()
            .and_then(|identity| schema.column_by_identity(identity))
            .cloned();
        match passthrough {
            Some(column) => columns.push(column),
            None => {
                if let Some(column) = schema_column_of(group) {
                    columns.push(column);
                }
            }
        }
    }
    for aggregate in &node.aggregates {
        if let Some(column) = schema_column_of(aggregate) {
            columns.push(column);
        }
    }
    node.schema = Some(RelationSchema::new("aggregate", columns));
    node.input = Box::new(input);
    Ok(LogicalPlan::AggregateAndGroup(node))
}

/// Bind aggregator expressions: parameters resolve against the input, and
/// non-trivial parameters get synthetic identities so the operator can
/// materialise them before aggregating.
fn bind_aggregate_expressions(
    aggregates: Vec<Expression>,
    schema: &RelationSchema,
) -> Result<Vec<Expression>> {
    let mut bound = Vec::with_capacity(aggregates.len());
    for aggregate in aggregates {
        let (name, parameters, distinct, order_ascending, limit) = match aggregate.kind {
            ExpressionKind::Aggregator {
                name,
                parameters,
                distinct,
                order_ascending,
                limit,
            } => (name, parameters, distinct, order_ascending, limit),
            _ => {
                return Err(EngineError::Internal(
                    "non-aggregator in aggregate list".to_string(),
                ))
            }
        };

        let mut bound_parameters = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            let mut parameter = bind_expression(parameter, schema, &[], false)?;
            let needs_synthetic_column = !matches!(
                parameter.kind,
                ExpressionKind::Identifier { .. } | ExpressionKind::Wildcard { .. }
            );
            if needs_synthetic_column && parameter.binding.is_none() {
                parameter.binding = Some(ColumnBinding {
                    identity: new_identity(),
                    query_column: parameter.to_string(),
                    data_type: infer_type(&parameter),
                });
            }
            bound_parameters.push(parameter);
        }

        let input_type = bound_parameters
            .first()
            .map(|p| match p.kind {
                ExpressionKind::Wildcard { .. } => DataType::Integer,
                _ => infer_type(p),
            })
            .unwrap_or(DataType::Null);

        let mut expression = Expression::new(ExpressionKind::Aggregator {
            name: name.clone(),
            parameters: bound_parameters,
            distinct,
            order_ascending,
            limit,
        });
        expression.binding = match aggregate.binding {
            Some(binding) => Some(ColumnBinding {
                data_type: aggregations::return_type(&name, input_type),
                ..binding
            }),
            None => Some(ColumnBinding {
                identity: new_identity(),
                query_column: expression.to_string(),
                data_type: aggregations::return_type(&name, input_type),
            }),
        };
        bound.push(expression);
    }
    Ok(bound)
}

fn bind_join(mut node: crate::logical_planner::Join, ctx: &BindContext) -> Result<LogicalPlan> {
    let left = bind_plan(*node.left, ctx)?;
    let left_schema = input_schema(&left)?;

    // CROSS JOIN UNNEST(column): the list argument binds against the left
    let right = match (*node.right, node.join_type) {
        (LogicalPlan::FunctionDataset(mut dataset), JoinType::Cross)
            if dataset.function == DatasetFunction::Unnest
                && matches!(
                    dataset.args.first().map(|a| a.node_type()),
                    Some(NodeType::Identifier)
                ) =>
        {
            let arg = dataset.args.remove(0);
            let arg = bind_expression(arg, &left_schema, &[], false)?;
            dataset.args = vec![arg];
            dataset.schema = Some(RelationSchema::new(
                dataset.alias.clone(),
                vec![dataset_column(
                    &dataset.columns[0],
                    DataType::Null,
                    &dataset.alias,
                )],
            ));
            LogicalPlan::FunctionDataset(dataset)
        }
        (right, _) => bind_plan(right, ctx)?,
    };
    let right_schema = input_schema(&right)?;

    let mut combined_columns = left_schema.columns.clone();
    combined_columns.extend(right_schema.columns.clone());
    let combined = RelationSchema::new("join", combined_columns);

    // ON pairs: bind against the combined scope, then normalise so the
    // first element references the left side
    let mut normalised = Vec::with_capacity(node.on.len());
    for (a, b) in std::mem::take(&mut node.on) {
        let mut a = bind_expression(a, &combined, &[], false)?;
        let mut b = bind_expression(b, &combined, &[], false)?;
        // computed key sides get synthetic identities so the operator can
        // materialise them before hashing
        for side in [&mut a, &mut b] {
            if side.binding.is_none() {
                side.binding = Some(ColumnBinding {
                    identity: new_identity(),
                    query_column: side.to_string(),
                    data_type: infer_type(side),
                });
            }
        }
        let a_left = references_schema(&a, &left_schema);
        let b_left = references_schema(&b, &left_schema);
        match (a_left, b_left) {
            (true, false) => normalised.push((a, b)),
            (false, true) => normalised.push((b, a)),
            _ => {
                return Err(EngineError::Sql(
                    "JOIN conditions must reference both sides".to_string(),
                ))
            }
        }
    }
    node.on = normalised;

    // USING names must resolve uniquely on both sides
    for name in &node.using {
        for (schema, side) in [(&left_schema, "left"), (&right_schema, "right")] {
            let matches = schema.find_columns(None, name);
            if matches.is_empty() {
                return Err(EngineError::column_not_found(
                    name.clone(),
                    schema.suggestion(name).as_deref(),
                ));
            }
            if matches.len() > 1 {
                return Err(EngineError::AmbiguousIdentifier(format!(
                    "{name} on the {side} side of the join"
                )));
            }
        }
    }

    let output = join_output_schema(&node.join_type, &node.using, &left_schema, &right_schema);
    node.schema = Some(output);
    node.left = Box::new(left);
    node.right = Box::new(right);
    Ok(LogicalPlan::Join(node))
}

fn references_schema(expr: &Expression, schema: &RelationSchema) -> bool {
    expr.referenced_identities()
        .iter()
        .any(|identity| schema.column_by_identity(identity).is_some())
}

/// The user-visible shape of a join: SEMI/ANTI keep the left side only,
/// USING coalesces the key columns, and colliding names from the right are
/// qualified with their relation.
fn join_output_schema(
    join_type: &JoinType,
    using: &[String],
    left: &RelationSchema,
    right: &RelationSchema,
) -> RelationSchema {
    let mut columns = left.columns.clone();
    if !matches!(join_type, JoinType::LeftSemi | JoinType::LeftAnti) {
        for column in &right.columns {
            if using
                .iter()
                .any(|name| column.answers_to(None, name))
            {
                continue;
            }
            let mut column = column.clone();
            if columns
                .iter()
                .any(|existing| existing.query_column == column.query_column)
            {
                if let Some(relation) = &column.relation {
                    column.query_column = format!("{}.{}", relation, column.query_column);
                }
            }
            columns.push(column);
        }
    }
    RelationSchema::new("join", columns)
}

fn bind_sort(mut node: crate::logical_planner::Sort, ctx: &BindContext) -> Result<LogicalPlan> {
    let input = bind_plan(*node.input, ctx)?;
    let schema = input_schema(&input)?;
    let aggregates = exposed_aggregates(&input);

    let hints = std::mem::take(&mut node.hints);
    let mut keys = Vec::with_capacity(node.keys.len());
    for (key, direction) in std::mem::take(&mut node.keys) {
        // a key may be a projection alias or position instead of a column
        let key = resolve_against_hints(key, &hints)?;
        let key = bind_expression(key, &schema, &aggregates, true)?;
        keys.push((key, direction));
    }
    node.keys = keys;
    node.input = Box::new(input);
    Ok(LogicalPlan::Sort(node))
}

/// ORDER BY may reference SELECT aliases (`ORDER BY n`) or positions
/// (`ORDER BY 2`); both resolve to the select item expression.
fn resolve_against_hints(key: Expression, hints: &[Expression]) -> Result<Expression> {
    match &key.kind {
        ExpressionKind::Literal(Datum::Integer(position)) => {
            let index = *position as usize;
            if index == 0 || index > hints.len() {
                return Err(EngineError::Sql(format!(
                    "ORDER BY position {position} is out of range"
                )));
            }
            Ok(hints[index - 1].clone())
        }
        ExpressionKind::Identifier { qualifier: None, name } => {
            for hint in hints {
                if let Some(binding) = &hint.binding {
                    if binding.query_column.eq_ignore_ascii_case(name) {
                        return Ok(hint.clone());
                    }
                }
            }
            Ok(key)
        }
        _ => Ok(key),
    }
}

fn bind_distinct(
    mut node: crate::logical_planner::Distinct,
    ctx: &BindContext,
) -> Result<LogicalPlan> {
    let input = bind_plan(*node.input, ctx)?;
    let schema = input_schema(&input)?;
    let aggregates = exposed_aggregates(&input);

    let expanded = expand_wildcards(std::mem::take(&mut node.on), &schema)?;
    node.on = expanded
        .into_iter()
        .map(|expr| bind_expression(expr, &schema, &aggregates, true))
        .collect::<Result<_>>()?;
    node.input = Box::new(input);
    Ok(LogicalPlan::Distinct(node))
}

fn bind_union(mut node: crate::logical_planner::Union, ctx: &BindContext) -> Result<LogicalPlan> {
    let left = bind_plan(*node.left, ctx)?;
    let right = bind_plan(*node.right, ctx)?;
    let left_schema = input_schema(&left)?;
    let right_schema = input_schema(&right)?;

    if left_schema.columns.len() != right_schema.columns.len() {
        return Err(EngineError::Sql(format!(
            "UNION branches return {} and {} columns",
            left_schema.columns.len(),
            right_schema.columns.len()
        )));
    }
    for (a, b) in left_schema.columns.iter().zip(&right_schema.columns) {
        if a.data_type.promote(b.data_type).is_none() {
            return Err(EngineError::TypeMismatch(format!(
                "UNION column '{}' combines {} with {}",
                a.query_column, a.data_type, b.data_type
            )));
        }
    }

    node.schema = Some(left_schema);
    node.left = Box::new(left);
    node.right = Box::new(right);
    Ok(LogicalPlan::Union(node))
}

// ---------------------------------------------------------------------------
// expressions

fn input_schema(plan: &LogicalPlan) -> Result<RelationSchema> {
    plan.schema()
        .cloned()
        .ok_or_else(|| EngineError::Internal(format!("{} bound without a schema", plan.node_name())))
}

/// Bound computed expressions visible through pass-through nodes: the
/// aggregates (and group keys) of an aggregation below. Used to fold
/// `SUM(mass)` or a computed GROUP BY expression in HAVING/ORDER BY/SELECT
/// onto the already-computed column.
fn exposed_aggregates(plan: &LogicalPlan) -> Vec<Expression> {
    match plan {
        LogicalPlan::Aggregate(node) => node.aggregates.clone(),
        LogicalPlan::AggregateAndGroup(node) => {
            let mut exposed = node.groups.clone();
            exposed.extend(node.aggregates.clone());
            exposed
        }
        LogicalPlan::Filter(node) => exposed_aggregates(&node.input),
        LogicalPlan::Sort(node) => exposed_aggregates(&node.input),
        LogicalPlan::Limit(node) => exposed_aggregates(&node.input),
        LogicalPlan::Distinct(node) => exposed_aggregates(&node.input),
        _ => Vec::new(),
    }
}

fn expand_wildcards(
    columns: Vec<Expression>,
    schema: &RelationSchema,
) -> Result<Vec<Expression>> {
    let mut expanded = Vec::with_capacity(columns.len());
    for column in columns {
        match &column.kind {
            ExpressionKind::Wildcard { qualifier } => {
                let mut matched = false;
                for schema_column in &schema.columns {
                    if let Some(qualifier) = qualifier {
                        let in_relation = schema_column
                            .relation
                            .as_deref()
                            .map(|relation| relation.eq_ignore_ascii_case(qualifier))
                            .unwrap_or(false);
                        if !in_relation {
                            continue;
                        }
                    }
                    matched = true;
                    let mut identifier = Expression::identifier(
                        schema_column.relation.clone(),
                        schema_column.name.clone(),
                    );
                    identifier.binding = Some(ColumnBinding {
                        identity: schema_column.identity.clone(),
                        query_column: schema_column.query_column.clone(),
                        data_type: schema_column.data_type,
                    });
                    expanded.push(identifier);
                }
                if !matched {
                    return Err(EngineError::Sql(format!(
                        "wildcard '{column}' matches no columns"
                    )));
                }
            }
            _ => expanded.push(column),
        }
    }
    Ok(expanded)
}

/// Bind one expression against a schema. `aggregates` carries the bound
/// aggregate expressions of the input, matched textually the way repeated
/// aggregate expressions are folded together. With `at_top` the expression
/// is a result column and must end up with a binding.
fn bind_expression(
    expression: Expression,
    schema: &RelationSchema,
    aggregates: &[Expression],
    at_top: bool,
) -> Result<Expression> {
    let pre_set = expression.binding.clone();

    // a textual match against a computed aggregate replaces the whole node
    if !aggregates.is_empty() {
        let rendered = expression.to_string();
        for aggregate in aggregates {
            if aggregate.to_string() == rendered
                || aggregate
                    .binding
                    .as_ref()
                    .map(|b| b.query_column == rendered)
                    .unwrap_or(false)
            {
                let binding = aggregate.binding.clone().ok_or_else(|| {
                    EngineError::Internal("aggregate bound without a binding".to_string())
                })?;
                let mut replacement =
                    Expression::identifier(None, binding.query_column.clone());
                replacement.binding = Some(ColumnBinding {
                    identity: binding.identity,
                    query_column: pre_set
                        .as_ref()
                        .map(|b| b.query_column.clone())
                        .unwrap_or(binding.query_column),
                    data_type: binding.data_type,
                });
                return Ok(replacement);
            }
        }
    }

    let mut bound = rebind_children(expression, schema, aggregates)?;

    match &bound.kind {
        ExpressionKind::Identifier { qualifier, name } => {
            let matches = schema.find_columns(qualifier.as_deref(), name);
            match matches.len() {
                0 => {
                    return Err(EngineError::column_not_found(
                        bound.to_string(),
                        schema.suggestion(name).as_deref(),
                    ))
                }
                1 => {
                    let column = matches[0];
                    bound.binding = Some(ColumnBinding {
                        identity: column.identity.clone(),
                        query_column: pre_set
                            .as_ref()
                            .map(|b| b.query_column.clone())
                            .unwrap_or_else(|| column.query_column.clone()),
                        data_type: column.data_type,
                    });
                }
                _ => return Err(EngineError::AmbiguousIdentifier(bound.to_string())),
            }
        }
        ExpressionKind::Aggregator { name, .. } => {
            return Err(EngineError::Sql(format!(
                "aggregator '{name}' is not allowed here"
            )))
        }
        _ => {
            if at_top && bound.binding.is_none() {
                bound.binding = Some(ColumnBinding {
                    identity: new_identity(),
                    query_column: bound.to_string(),
                    data_type: infer_type(&bound),
                });
            } else if let Some(pre_set) = pre_set {
                bound.binding = Some(ColumnBinding {
                    data_type: infer_type(&bound),
                    ..pre_set
                });
            }
        }
    }

    Ok(bound)
}

fn rebind_children(
    expression: Expression,
    schema: &RelationSchema,
    aggregates: &[Expression],
) -> Result<Expression> {
    let binding = expression.binding;
    let kind = match expression.kind {
        kind @ (ExpressionKind::Literal(_)
        | ExpressionKind::Identifier { .. }
        | ExpressionKind::Wildcard { .. }) => kind,
        ExpressionKind::Function { name, parameters } => ExpressionKind::Function {
            name,
            parameters: parameters
                .into_iter()
                .map(|p| bind_expression(p, schema, aggregates, false))
                .collect::<Result<_>>()?,
        },
        ExpressionKind::Aggregator {
            name,
            parameters,
            distinct,
            order_ascending,
            limit,
        } => ExpressionKind::Aggregator {
            name,
            parameters: parameters
                .into_iter()
                .map(|p| bind_expression(p, schema, aggregates, false))
                .collect::<Result<_>>()?,
            distinct,
            order_ascending,
            limit,
        },
        ExpressionKind::BinaryOperator { op, left, right } => ExpressionKind::BinaryOperator {
            op,
            left: Box::new(bind_expression(*left, schema, aggregates, false)?),
            right: Box::new(bind_expression(*right, schema, aggregates, false)?),
        },
        ExpressionKind::ComparisonOperator { op, left, right } => {
            ExpressionKind::ComparisonOperator {
                op,
                left: Box::new(bind_expression(*left, schema, aggregates, false)?),
                right: Box::new(bind_expression(*right, schema, aggregates, false)?),
            }
        }
        ExpressionKind::UnaryOperator { op, operand } => ExpressionKind::UnaryOperator {
            op,
            operand: Box::new(bind_expression(*operand, schema, aggregates, false)?),
        },
        ExpressionKind::Nested(inner) => ExpressionKind::Nested(Box::new(bind_expression(
            *inner, schema, aggregates, false,
        )?)),
        ExpressionKind::And { left, right } => ExpressionKind::And {
            left: Box::new(bind_expression(*left, schema, aggregates, false)?),
            right: Box::new(bind_expression(*right, schema, aggregates, false)?),
        },
        ExpressionKind::Or { left, right } => ExpressionKind::Or {
            left: Box::new(bind_expression(*left, schema, aggregates, false)?),
            right: Box::new(bind_expression(*right, schema, aggregates, false)?),
        },
        ExpressionKind::Not(inner) => ExpressionKind::Not(Box::new(bind_expression(
            *inner, schema, aggregates, false,
        )?)),
    };
    Ok(Expression { kind, binding })
}

fn schema_column_of(expression: &Expression) -> Option<SchemaColumn> {
    expression.binding.as_ref().map(|binding| SchemaColumn {
        identity: binding.identity.clone(),
        name: binding.query_column.clone(),
        query_column: binding.query_column.clone(),
        data_type: binding.data_type,
        relation: None,
        aliases: Vec::new(),
    })
}

/// Result type of a bound expression.
pub fn infer_type(expression: &Expression) -> DataType {
    match &expression.kind {
        ExpressionKind::Literal(datum) => datum.data_type(),
        ExpressionKind::Identifier { .. } | ExpressionKind::Wildcard { .. } => expression
            .binding
            .as_ref()
            .map(|b| b.data_type)
            .unwrap_or(DataType::Null),
        ExpressionKind::Function { name, parameters } => match functions::lookup(name) {
            Some(entry) => {
                let argument_types: Vec<DataType> =
                    parameters.iter().map(infer_type).collect();
                (entry.return_type)(&argument_types)
            }
            None => DataType::Null,
        },
        ExpressionKind::Aggregator {
            name, parameters, ..
        } => {
            let input = parameters.first().map(infer_type).unwrap_or(DataType::Null);
            aggregations::return_type(name, input)
        }
        ExpressionKind::BinaryOperator { op, left, right } => match op {
            BinaryOp::StringConcat => DataType::Varchar,
            BinaryOp::Divide => DataType::Double,
            _ => match (infer_type(left), infer_type(right)) {
                (DataType::Integer, DataType::Integer) => DataType::Integer,
                (a, b) => a.promote(b).unwrap_or(DataType::Double),
            },
        },
        ExpressionKind::ComparisonOperator { .. }
        | ExpressionKind::And { .. }
        | ExpressionKind::Or { .. }
        | ExpressionKind::Not(_) => DataType::Boolean,
        ExpressionKind::UnaryOperator { op, operand } => match op {
            crate::expression::UnaryOp::Negative => infer_type(operand),
            _ => DataType::Boolean,
        },
        ExpressionKind::Nested(inner) => infer_type(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical_planner::plan_statement;
    use crate::parser;
    use crate::permissions::all_permissions;
    use crate::sql_rewriter::TemporalFilters;

    fn bound(sql: &str) -> Result<LogicalPlan> {
        let statements = parser::parse(sql)?;
        let planned =
            plan_statement(&statements[0], &TemporalFilters::new(), &all_permissions())?;
        bind(planned.plan, &BindContext::new(None))
    }

    #[test]
    fn test_identifiers_resolve_to_identities() {
        let plan = bound("SELECT name FROM $planets WHERE id = 3").unwrap();
        let schema = plan.schema().unwrap();
        assert_eq!(schema.columns.len(), 1);
        assert_eq!(schema.columns[0].query_column, "name");
        assert!(!schema.columns[0].identity.is_empty());
    }

    #[test]
    fn test_unknown_column_with_suggestion() {
        let error = bound("SELECT nmae FROM $planets").unwrap_err();
        assert!(error.to_string().contains("did you mean 'name'"));
    }

    #[test]
    fn test_wildcard_expansion() {
        let plan = bound("SELECT * FROM $planets").unwrap();
        let schema = plan.schema().unwrap();
        assert_eq!(
            schema
                .columns
                .iter()
                .map(|c| c.query_column.as_str())
                .collect::<Vec<_>>(),
            vec!["id", "name", "mass"]
        );
    }

    #[test]
    fn test_self_join_gets_distinct_identities() {
        let plan =
            bound("SELECT * FROM $planets AS a INNER JOIN $planets AS b ON a.id = b.id")
                .unwrap();
        let schema = plan.schema().unwrap();
        assert_eq!(schema.columns.len(), 6);
        let identities: std::collections::HashSet<_> =
            schema.columns.iter().map(|c| c.identity.clone()).collect();
        assert_eq!(identities.len(), 6);
    }

    #[test]
    fn test_join_collision_qualified() {
        let plan =
            bound("SELECT * FROM $planets AS a INNER JOIN $planets AS b ON a.id = b.id")
                .unwrap();
        let schema = plan.schema().unwrap();
        let names: Vec<_> = schema
            .columns
            .iter()
            .map(|c| c.query_column.clone())
            .collect();
        assert!(names.contains(&"name".to_string()));
        assert!(names.contains(&"b.name".to_string()));
    }

    #[test]
    fn test_ambiguous_identifier() {
        let error =
            bound("SELECT name FROM $planets AS a INNER JOIN $planets AS b ON a.id = b.id")
                .unwrap_err();
        assert!(matches!(error, EngineError::AmbiguousIdentifier(_)));
    }

    #[test]
    fn test_filter_requires_boolean() {
        let error = bound("SELECT name FROM $planets WHERE mass").unwrap_err();
        assert!(matches!(error, EngineError::TypeMismatch(_)));
    }

    #[test]
    fn test_having_folds_onto_computed_aggregate() {
        let plan =
            bound("SELECT id, SUM(mass) FROM $planets GROUP BY id HAVING SUM(mass) > 0")
                .unwrap();
        // the HAVING predicate must not contain an aggregator after binding
        fn find_filter(plan: &LogicalPlan) -> Option<&crate::logical_planner::Filter> {
            match plan {
                LogicalPlan::Filter(filter) => Some(filter),
                _ => plan.inputs().into_iter().find_map(find_filter),
            }
        }
        let filter = find_filter(&plan).unwrap();
        assert!(!filter.predicate.contains_aggregator());
    }

    #[test]
    fn test_positional_group_by() {
        let plan = bound("SELECT name, COUNT(*) FROM $planets GROUP BY 1").unwrap();
        let schema = plan.schema().unwrap();
        assert_eq!(schema.columns[0].query_column, "name");
    }

    #[test]
    fn test_aliased_projection_names_output() {
        let plan = bound("SELECT UPPER(name) AS n FROM $planets").unwrap();
        let schema = plan.schema().unwrap();
        assert_eq!(schema.columns[0].query_column, "n");
        assert_eq!(schema.columns[0].data_type, DataType::Varchar);
    }

    #[test]
    fn test_union_arity_mismatch() {
        let error = bound("SELECT id FROM $planets UNION ALL SELECT id, name FROM $planets")
            .unwrap_err();
        assert!(matches!(error, EngineError::Sql(_)));
    }
}
