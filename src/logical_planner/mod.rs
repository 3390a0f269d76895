//! AST to logical plan.
//!
//! Produces one plan per statement, resolving CTEs into named sub-plans and
//! derived tables into nested sub-plans. Clause ordering is fixed:
//! FROM → JOINs → WHERE → GROUP BY → HAVING → DISTINCT → ORDER BY →
//! LIMIT/OFFSET → Projection; the physical planner appends the Exit.
//!
//! Before a plan is emitted the connection's permissions are checked
//! against the statement kind.

use std::collections::HashMap;
use std::collections::HashSet;

use sqlparser::ast as sql;
use sqlparser::ast::Statement;

use crate::catalogue::new_identity;
use crate::errors::{EngineError, Result};
use crate::expression::from_ast::convert_expr;
use crate::expression::{ColumnBinding, Expression, ExpressionKind, NodeType};
use crate::morsel::DataType;
use crate::permissions::Permission;
use crate::sql_rewriter::TemporalFilters;

pub mod plan;

pub use plan::{
    Aggregate, AggregateAndGroup, DatasetFunction, Direction, Distinct, Explain, Filter,
    FunctionDataset, Join, JoinType, Limit, LogicalPlan, Project, Read, ShowColumns, ShowCreate,
    Sort, Union,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Explain,
    Show,
}

impl StatementKind {
    pub fn required_permission(&self) -> Permission {
        match self {
            StatementKind::Query => Permission::Query,
            StatementKind::Explain => Permission::Explain,
            StatementKind::Show => Permission::Show,
        }
    }
}

pub struct PlannedStatement {
    pub plan: LogicalPlan,
    pub kind: StatementKind,
    pub ctes: HashMap<String, LogicalPlan>,
}

type Ctes = HashMap<String, LogicalPlan>;

/// Plan one parsed statement. `temporal_filters` carries the `FOR` ranges
/// the SQL rewriter extracted; they are stamped onto matching Read nodes.
pub fn plan_statement(
    statement: &Statement,
    temporal_filters: &TemporalFilters,
    permissions: &HashSet<Permission>,
) -> Result<PlannedStatement> {
    let planned = build_statement(statement, temporal_filters)?;

    let required = planned.kind.required_permission();
    if !permissions.contains(&required) {
        return Err(EngineError::Permissions(format!(
            "connection does not hold the '{required}' permission"
        )));
    }

    log::debug!("logical plan:\n{}", planned.plan.draw());
    Ok(planned)
}

fn build_statement(
    statement: &Statement,
    temporal_filters: &TemporalFilters,
) -> Result<PlannedStatement> {
    match statement {
        Statement::Query(query) => {
            let mut ctes = Ctes::new();
            let plan = plan_query(query, temporal_filters, &mut ctes)?;
            Ok(PlannedStatement {
                plan,
                kind: StatementKind::Query,
                ctes,
            })
        }
        Statement::Explain { statement, .. } => {
            let inner = build_statement(statement, temporal_filters)?;
            Ok(PlannedStatement {
                plan: LogicalPlan::Explain(Explain {
                    inner: Box::new(inner.plan),
                }),
                kind: StatementKind::Explain,
                ctes: inner.ctes,
            })
        }
        Statement::ShowColumns {
            table_name, full, ..
        } => Ok(PlannedStatement {
            plan: LogicalPlan::ShowColumns(ShowColumns {
                relation: table_name.to_string(),
                full: *full,
                schema: None,
            }),
            kind: StatementKind::Show,
            ctes: Ctes::new(),
        }),
        Statement::ShowFunctions { .. } => Ok(PlannedStatement {
            plan: LogicalPlan::ShowFunctions,
            kind: StatementKind::Show,
            ctes: Ctes::new(),
        }),
        Statement::ShowVariables { .. } => Ok(PlannedStatement {
            plan: LogicalPlan::ShowVariables,
            kind: StatementKind::Show,
            ctes: Ctes::new(),
        }),
        Statement::ShowVariable { variable } => {
            let name = variable
                .iter()
                .map(|ident| ident.value.to_lowercase())
                .collect::<Vec<_>>()
                .join(" ");
            match name.as_str() {
                "databases" => Ok(PlannedStatement {
                    plan: LogicalPlan::ShowDatabases,
                    kind: StatementKind::Show,
                    ctes: Ctes::new(),
                }),
                "variables" => Ok(PlannedStatement {
                    plan: LogicalPlan::ShowVariables,
                    kind: StatementKind::Show,
                    ctes: Ctes::new(),
                }),
                other => Err(EngineError::UnsupportedSyntax(format!("SHOW {other}"))),
            }
        }
        Statement::ShowCreate { obj_name, .. } => Ok(PlannedStatement {
            plan: LogicalPlan::ShowCreate(ShowCreate {
                relation: obj_name.to_string(),
                schema: None,
            }),
            kind: StatementKind::Show,
            ctes: Ctes::new(),
        }),
        other => Err(EngineError::UnsupportedSyntax(format!(
            "statement '{}' is not supported",
            summarise_statement(other)
        ))),
    }
}

fn summarise_statement(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// queries

fn plan_query(
    query: &sql::Query,
    temporal_filters: &TemporalFilters,
    ctes_out: &mut Ctes,
) -> Result<LogicalPlan> {
    let mut ctes = ctes_out.clone();
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            let mut inner_ctes = ctes.clone();
            let subplan = plan_query(&cte.query, temporal_filters, &mut inner_ctes)?;
            ctes.insert(cte.alias.name.value.to_lowercase(), subplan);
        }
    }
    *ctes_out = ctes.clone();

    let (mut plan, select_items) = match query.body.as_ref() {
        sql::SetExpr::Select(select) => plan_select_core(select, temporal_filters, &ctes)?,
        other => (plan_set_expr(other, temporal_filters, &ctes)?, Vec::new()),
    };

    // ORDER BY sits below LIMIT and the final projection
    if !query.order_by.is_empty() {
        let mut keys = Vec::with_capacity(query.order_by.len());
        for item in &query.order_by {
            let direction = if item.asc.unwrap_or(true) {
                Direction::Ascending
            } else {
                Direction::Descending
            };
            keys.push((convert_expr(&item.expr)?, direction));
        }
        plan = LogicalPlan::Sort(Sort {
            keys,
            hints: select_items.clone(),
            input: Box::new(plan),
        });
    }

    let limit = match &query.limit {
        Some(expr) => Some(expr_to_count(expr, "LIMIT")?),
        None => None,
    };
    let offset = match &query.offset {
        Some(offset) => expr_to_count(&offset.value, "OFFSET")?,
        None => 0,
    };
    if limit.is_some() || offset > 0 {
        plan = LogicalPlan::Limit(Limit {
            limit,
            offset,
            input: Box::new(plan),
        });
    }

    if !select_items.is_empty() {
        plan = LogicalPlan::Project(Project {
            columns: select_items,
            input: Box::new(plan),
            schema: None,
        });
    }

    Ok(plan)
}

fn expr_to_count(expr: &sql::Expr, clause: &str) -> Result<usize> {
    match convert_expr(expr)?.kind {
        ExpressionKind::Literal(crate::morsel::Datum::Integer(n)) if n >= 0 => Ok(n as usize),
        _ => Err(EngineError::Sql(format!(
            "{clause} expects a non-negative integer"
        ))),
    }
}

fn plan_set_expr(
    body: &sql::SetExpr,
    temporal_filters: &TemporalFilters,
    ctes: &Ctes,
) -> Result<LogicalPlan> {
    match body {
        sql::SetExpr::Select(select) => {
            let (core, select_items) = plan_select_core(select, temporal_filters, ctes)?;
            if select_items.is_empty() {
                return Ok(core);
            }
            Ok(LogicalPlan::Project(Project {
                columns: select_items,
                input: Box::new(core),
                schema: None,
            }))
        }
        sql::SetExpr::Query(query) => {
            let mut inner_ctes = ctes.clone();
            plan_query(query, temporal_filters, &mut inner_ctes)
        }
        sql::SetExpr::SetOperation {
            op: sql::SetOperator::Union,
            set_quantifier,
            left,
            right,
        } => {
            let all = matches!(set_quantifier, sql::SetQuantifier::All);
            Ok(LogicalPlan::Union(Union {
                all,
                left: Box::new(plan_set_expr(left, temporal_filters, ctes)?),
                right: Box::new(plan_set_expr(right, temporal_filters, ctes)?),
                schema: None,
            }))
        }
        sql::SetExpr::SetOperation { op, .. } => Err(EngineError::UnsupportedSyntax(format!(
            "set operation '{op}'"
        ))),
        sql::SetExpr::Values(values) => plan_values(values, None),
        other => Err(EngineError::UnsupportedSyntax(format!("{other}"))),
    }
}

fn plan_values(values: &sql::Values, alias: Option<&sql::TableAlias>) -> Result<LogicalPlan> {
    let mut rows = Vec::with_capacity(values.rows.len());
    for row in &values.rows {
        let mut converted = Vec::with_capacity(row.len());
        for expr in row {
            converted.push(convert_expr(expr)?);
        }
        rows.push(converted);
    }
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    let columns: Vec<String> = match alias {
        Some(alias) if !alias.columns.is_empty() => alias
            .columns
            .iter()
            .map(|ident| ident.value.clone())
            .collect(),
        _ => (0..width).map(|i| format!("column_{i}")).collect(),
    };
    let alias_name = alias
        .map(|a| a.name.value.clone())
        .unwrap_or_else(|| "values".to_string());
    Ok(LogicalPlan::FunctionDataset(FunctionDataset {
        function: DatasetFunction::Values,
        alias: alias_name,
        columns,
        args: Vec::new(),
        rows,
        schema: None,
    }))
}

// ---------------------------------------------------------------------------
// SELECT

/// Plan FROM → JOIN → WHERE → GROUP/aggregate → HAVING → DISTINCT, and
/// return the converted SELECT items for the later Sort/Project stages.
fn plan_select_core(
    select: &sql::Select,
    temporal_filters: &TemporalFilters,
    ctes: &Ctes,
) -> Result<(LogicalPlan, Vec<Expression>)> {
    let mut select_items = convert_select_items(&select.projection)?;

    // FROM; a dataset-returning function in SELECT position with no FROM
    // becomes the source relation
    let mut plan = if select.from.is_empty() {
        match hoist_dataset_function(&mut select_items)? {
            Some(source) => source,
            None => LogicalPlan::Read(Read {
                relation: crate::samples::NO_TABLE.to_string(),
                alias: crate::samples::NO_TABLE.to_string(),
                temporal: None,
                subplan: None,
                schema: None,
            }),
        }
    } else {
        let mut sources = Vec::with_capacity(select.from.len());
        for table in &select.from {
            sources.push(plan_table_with_joins(table, temporal_filters, ctes)?);
        }
        let mut iterator = sources.into_iter();
        let first = iterator
            .next()
            .ok_or_else(|| EngineError::Internal("empty FROM list".to_string()))?;
        iterator.fold(first, |left, right| {
            LogicalPlan::Join(Join {
                join_type: JoinType::Cross,
                on: Vec::new(),
                using: Vec::new(),
                left: Box::new(left),
                right: Box::new(right),
                schema: None,
            })
        })
    };

    // WHERE
    if let Some(selection) = &select.selection {
        plan = LogicalPlan::Filter(Filter {
            predicate: convert_expr(selection)?,
            input: Box::new(plan),
        });
    }

    // GROUP BY and aggregates
    let groups: Vec<Expression> = match &select.group_by {
        sql::GroupByExpr::Expressions(exprs) => exprs
            .iter()
            .map(convert_expr)
            .collect::<Result<Vec<_>>>()?,
        sql::GroupByExpr::All => {
            return Err(EngineError::UnsupportedSyntax("GROUP BY ALL".to_string()))
        }
    };

    let having = select.having.as_ref().map(convert_expr).transpose()?;

    let mut aggregates: Vec<Expression> = Vec::new();
    let mut seen_aggregates: Vec<String> = Vec::new();
    let mut collect = |expr: &Expression| {
        for aggregate in expr.nodes_of_type(&[NodeType::Aggregator]) {
            let key = aggregate.to_string();
            if !seen_aggregates.contains(&key) {
                seen_aggregates.push(key);
                aggregates.push(aggregate.clone());
            }
        }
    };
    for item in &select_items {
        collect(item);
    }
    if let Some(having) = &having {
        collect(having);
    }

    if !groups.is_empty() {
        plan = LogicalPlan::AggregateAndGroup(AggregateAndGroup {
            groups,
            aggregates,
            projection: select_items.clone(),
            input: Box::new(plan),
            schema: None,
        });
    } else if !aggregates.is_empty() {
        plan = LogicalPlan::Aggregate(Aggregate {
            aggregates,
            input: Box::new(plan),
            schema: None,
        });
    } else if having.is_some() {
        return Err(EngineError::UnsupportedSyntax(
            "HAVING without aggregation".to_string(),
        ));
    }

    // HAVING
    if let Some(having) = having {
        plan = LogicalPlan::Filter(Filter {
            predicate: having,
            input: Box::new(plan),
        });
    }

    // DISTINCT applies to the projected tuple
    match &select.distinct {
        None => {}
        Some(sql::Distinct::Distinct) => {
            plan = LogicalPlan::Distinct(Distinct {
                on: select_items.clone(),
                input: Box::new(plan),
            });
        }
        Some(sql::Distinct::On(_)) => {
            return Err(EngineError::UnsupportedSyntax("DISTINCT ON".to_string()))
        }
    }

    Ok((plan, select_items))
}

fn convert_select_items(projection: &[sql::SelectItem]) -> Result<Vec<Expression>> {
    let mut items = Vec::with_capacity(projection.len());
    for item in projection {
        match item {
            sql::SelectItem::UnnamedExpr(expr) => items.push(convert_expr(expr)?),
            sql::SelectItem::ExprWithAlias { expr, alias } => {
                let mut converted = convert_expr(expr)?;
                // the alias pre-claims the result column's name and identity
                converted.binding = Some(ColumnBinding {
                    identity: new_identity(),
                    query_column: alias.value.clone(),
                    data_type: DataType::Null,
                });
                items.push(converted);
            }
            sql::SelectItem::Wildcard(_) => {
                items.push(Expression::new(ExpressionKind::Wildcard { qualifier: None }));
            }
            sql::SelectItem::QualifiedWildcard(qualifier, _) => {
                items.push(Expression::new(ExpressionKind::Wildcard {
                    qualifier: Some(qualifier.to_string()),
                }));
            }
        }
    }
    Ok(items)
}

fn dataset_function(name: &str) -> Option<DatasetFunction> {
    match name.to_uppercase().as_str() {
        "GENERATE_SERIES" => Some(DatasetFunction::GenerateSeries),
        "UNNEST" => Some(DatasetFunction::Unnest),
        "FAKE" => Some(DatasetFunction::Fake),
        _ => None,
    }
}

/// `SELECT GENERATE_SERIES(1, 5) AS i` and friends: the set-returning call
/// becomes the source, and the select item collapses to an identifier over
/// its output column.
fn hoist_dataset_function(select_items: &mut [Expression]) -> Result<Option<LogicalPlan>> {
    if select_items.len() != 1 {
        return Ok(None);
    }
    let (function, args) = match &select_items[0].kind {
        ExpressionKind::Function { name, parameters } => {
            match dataset_function(name) {
                Some(function) => (function, parameters.clone()),
                None => return Ok(None),
            }
        }
        _ => return Ok(None),
    };
    let column_name = select_items[0]
        .binding
        .as_ref()
        .map(|b| b.query_column.clone())
        .unwrap_or_else(|| function.to_string().to_lowercase());
    let binding = select_items[0].binding.clone();
    let mut replacement = Expression::identifier(None, column_name.clone());
    replacement.binding = binding;
    select_items[0] = replacement;
    Ok(Some(LogicalPlan::FunctionDataset(FunctionDataset {
        function,
        alias: column_name.clone(),
        columns: vec![column_name],
        args,
        rows: Vec::new(),
        schema: None,
    })))
}

// ---------------------------------------------------------------------------
// FROM clause

fn plan_table_with_joins(
    table: &sql::TableWithJoins,
    temporal_filters: &TemporalFilters,
    ctes: &Ctes,
) -> Result<LogicalPlan> {
    let mut plan = plan_table_factor(&table.relation, temporal_filters, ctes)?;

    for join in &table.joins {
        let right = plan_table_factor(&join.relation, temporal_filters, ctes)?;
        let (join_type, constraint) = match &join.join_operator {
            sql::JoinOperator::Inner(c) => (JoinType::Inner, Some(c)),
            sql::JoinOperator::LeftOuter(c) => (JoinType::LeftOuter, Some(c)),
            sql::JoinOperator::RightOuter(c) => (JoinType::RightOuter, Some(c)),
            sql::JoinOperator::FullOuter(c) => (JoinType::FullOuter, Some(c)),
            sql::JoinOperator::LeftSemi(c) => (JoinType::LeftSemi, Some(c)),
            sql::JoinOperator::LeftAnti(c) => (JoinType::LeftAnti, Some(c)),
            sql::JoinOperator::CrossJoin => (JoinType::Cross, None),
            other => {
                return Err(EngineError::UnsupportedSyntax(format!(
                    "join type {other:?}"
                )))
            }
        };

        let (on, using) = match constraint {
            None | Some(sql::JoinConstraint::None) => {
                if join_type != JoinType::Cross {
                    return Err(EngineError::Sql(
                        "JOIN requires an ON or USING condition".to_string(),
                    ));
                }
                (Vec::new(), Vec::new())
            }
            Some(sql::JoinConstraint::On(expr)) => {
                (decompose_join_on(&convert_expr(expr)?)?, Vec::new())
            }
            Some(sql::JoinConstraint::Using(idents)) => {
                if !matches!(join_type, JoinType::Inner | JoinType::LeftOuter) {
                    return Err(EngineError::Sql(
                        "JOIN USING is only valid for INNER and LEFT OUTER joins".to_string(),
                    ));
                }
                (
                    Vec::new(),
                    idents.iter().map(|i| i.value.to_lowercase()).collect(),
                )
            }
            Some(sql::JoinConstraint::Natural) => {
                return Err(EngineError::UnsupportedSyntax("NATURAL JOIN".to_string()))
            }
        };

        plan = LogicalPlan::Join(Join {
            join_type,
            on,
            using,
            left: Box::new(plan),
            right: Box::new(right),
            schema: None,
        });
    }

    Ok(plan)
}

/// An ON condition must be an equality, or a conjunction of equalities.
fn decompose_join_on(expr: &Expression) -> Result<Vec<(Expression, Expression)>> {
    match &expr.kind {
        ExpressionKind::Nested(inner) => decompose_join_on(inner),
        ExpressionKind::And { left, right } => {
            let mut pairs = decompose_join_on(left)?;
            pairs.extend(decompose_join_on(right)?);
            Ok(pairs)
        }
        ExpressionKind::ComparisonOperator {
            op: crate::expression::ComparisonOp::Eq,
            left,
            right,
        } => Ok(vec![(left.as_ref().clone(), right.as_ref().clone())]),
        _ => Err(EngineError::UnsupportedSyntax(format!(
            "JOIN conditions must be equalities, got '{expr}'"
        ))),
    }
}

fn plan_table_factor(
    factor: &sql::TableFactor,
    temporal_filters: &TemporalFilters,
    ctes: &Ctes,
) -> Result<LogicalPlan> {
    match factor {
        sql::TableFactor::Table {
            name,
            alias,
            args: Some(args),
            ..
        } => {
            // a table function in FROM position
            let function_name = name
                .0
                .last()
                .map(|i| i.value.to_uppercase())
                .unwrap_or_default();
            let function = dataset_function(&function_name).ok_or_else(|| {
                EngineError::UnsupportedSyntax(format!(
                    "table function '{function_name}'"
                ))
            })?;
            let mut converted = Vec::with_capacity(args.len());
            for arg in args {
                match arg {
                    sql::FunctionArg::Unnamed(sql::FunctionArgExpr::Expr(expr)) => {
                        converted.push(convert_expr(expr)?)
                    }
                    other => {
                        return Err(EngineError::UnsupportedSyntax(format!(
                            "table function argument '{other}'"
                        )))
                    }
                }
            }
            let alias_name = alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .unwrap_or_else(|| function_name.to_lowercase());
            let columns = match alias {
                Some(alias) if !alias.columns.is_empty() => alias
                    .columns
                    .iter()
                    .map(|ident| ident.value.clone())
                    .collect(),
                _ => vec![alias_name.clone()],
            };
            Ok(LogicalPlan::FunctionDataset(FunctionDataset {
                function,
                alias: alias_name,
                columns,
                args: converted,
                rows: Vec::new(),
                schema: None,
            }))
        }
        sql::TableFactor::Table {
            name, alias, args: None, ..
        } => {
            let relation = name.to_string();
            let alias_name = alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .unwrap_or_else(|| relation.clone());

            let bare = name
                .0
                .last()
                .map(|i| i.value.to_lowercase())
                .unwrap_or_default();
            let subplan = if name.0.len() == 1 {
                ctes.get(&bare).cloned().map(Box::new)
            } else {
                None
            };

            let temporal = temporal_filters
                .get(&alias_name.to_lowercase())
                .or_else(|| temporal_filters.get(&relation.to_lowercase()))
                .or_else(|| temporal_filters.get(&bare))
                .copied();

            Ok(LogicalPlan::Read(Read {
                relation,
                alias: alias_name,
                temporal,
                subplan,
                schema: None,
            }))
        }
        sql::TableFactor::Derived {
            subquery, alias, ..
        } => {
            let mut inner_ctes = ctes.clone();
            let subplan = match subquery.body.as_ref() {
                sql::SetExpr::Values(values) => plan_values(values, alias.as_ref())?,
                _ => plan_query(subquery, temporal_filters, &mut inner_ctes)?,
            };
            let alias_name = alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .unwrap_or_else(|| "subquery".to_string());
            Ok(LogicalPlan::Read(Read {
                relation: alias_name.clone(),
                alias: alias_name,
                temporal: None,
                subplan: Some(Box::new(subplan)),
                schema: None,
            }))
        }
        sql::TableFactor::UNNEST {
            alias, array_exprs, ..
        } => {
            let expr = array_exprs
                .first()
                .ok_or_else(|| EngineError::Sql("UNNEST with no argument".to_string()))?;
            let alias_name = alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .unwrap_or_else(|| "unnest".to_string());
            let columns = match alias {
                Some(alias) if !alias.columns.is_empty() => alias
                    .columns
                    .iter()
                    .map(|ident| ident.value.clone())
                    .collect(),
                _ => vec![alias_name.clone()],
            };
            Ok(LogicalPlan::FunctionDataset(FunctionDataset {
                function: DatasetFunction::Unnest,
                alias: alias_name,
                columns,
                args: vec![convert_expr(expr)?],
                rows: Vec::new(),
                schema: None,
            }))
        }
        sql::TableFactor::NestedJoin {
            table_with_joins, ..
        } => plan_table_with_joins(table_with_joins, temporal_filters, ctes),
        other => Err(EngineError::UnsupportedSyntax(format!("{other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::permissions::all_permissions;

    fn plan(sql: &str) -> LogicalPlan {
        let statements = parser::parse(sql).unwrap();
        plan_statement(&statements[0], &TemporalFilters::new(), &all_permissions())
            .unwrap()
            .plan
    }

    #[test]
    fn test_clause_ordering() {
        let plan = plan(
            "SELECT name FROM $planets WHERE id > 1 ORDER BY name LIMIT 3",
        );
        // Projection above Limit above Sort above Filter above Read
        let rendered = plan.draw();
        let positions: Vec<usize> = ["Project", "Limit", "Sort", "Filter", "Read"]
            .iter()
            .map(|name| rendered.find(name).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort();
        assert_eq!(positions, sorted, "unexpected ordering:\n{rendered}");
    }

    #[test]
    fn test_group_by_produces_aggregate_and_group() {
        let plan = plan("SELECT id, SUM(mass) FROM $planets GROUP BY id");
        assert!(plan.draw().contains("AggregateAndGroup"));
    }

    #[test]
    fn test_ungrouped_aggregate() {
        let plan = plan("SELECT COUNT(*) FROM $planets");
        let rendered = plan.draw();
        assert!(rendered.contains("Aggregate (COUNT(*))"), "{rendered}");
        assert!(!rendered.contains("AggregateAndGroup"));
    }

    #[test]
    fn test_having_adds_filter_above_aggregate() {
        let plan =
            plan("SELECT id, SUM(mass) FROM $planets GROUP BY id HAVING SUM(mass) > 0");
        let rendered = plan.draw();
        let filter = rendered.find("Filter").unwrap();
        let aggregate = rendered.find("AggregateAndGroup").unwrap();
        assert!(filter < aggregate);
    }

    #[test]
    fn test_no_from_reads_no_table() {
        let plan = plan("SELECT 1");
        assert!(plan.draw().contains("$no_table"));
    }

    #[test]
    fn test_generate_series_hoisted_from_projection() {
        let plan = plan("SELECT GENERATE_SERIES(1, 5) AS i");
        let rendered = plan.draw();
        assert!(rendered.contains("FunctionDataset (GENERATE_SERIES)"), "{rendered}");
    }

    #[test]
    fn test_cte_becomes_subplan() {
        let plan = plan("WITH big AS (SELECT * FROM $planets WHERE mass > 100) SELECT name FROM big");
        let rendered = plan.draw();
        assert!(rendered.contains("Read (big as big)"), "{rendered}");
        assert!(rendered.contains("Filter"), "{rendered}");
    }

    #[test]
    fn test_using_rejected_for_full_join() {
        let statements =
            parser::parse("SELECT * FROM a FULL JOIN b USING (id)").unwrap();
        let result =
            plan_statement(&statements[0], &TemporalFilters::new(), &all_permissions());
        assert!(result.is_err());
    }

    #[test]
    fn test_permission_denied() {
        let statements = parser::parse("SELECT 1").unwrap();
        let mut show_only = HashSet::new();
        show_only.insert(Permission::Show);
        let result = plan_statement(&statements[0], &TemporalFilters::new(), &show_only);
        assert!(matches!(result, Err(EngineError::Permissions(_))));
    }

    #[test]
    fn test_union() {
        let plan = plan("SELECT name FROM $planets UNION ALL SELECT name FROM $planets");
        assert!(plan.draw().contains("Union (ALL)"));
    }
}
