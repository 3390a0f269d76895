//! Logical plan to physical operator DAG.
//!
//! A 1:1 lowering of bound logical nodes onto operator instances plus the
//! mandatory insertions: MorselDefragment above blob scans, the Exit
//! terminal, and a HeapSort where a Sort immediately precedes a Limit with
//! a small constant K. The plan is an arena of operators with integer
//! handles; producer arity is validated as edges are added.

use std::sync::Arc;

use crate::catalogue::{RelationSchema, SchemaColumn};
use crate::config::EngineConfig;
use crate::context::QueryContext;
use crate::errors::{EngineError, Result};
use crate::expression::{ColumnBinding, Expression};
use crate::logical_planner::{DatasetFunction, JoinType, LogicalPlan};
use crate::morsel::DataType;
use crate::operators::cross_join::CrossJoinMode;
use crate::operators::{
    cancellable, AggregateAndGroupOperator, AggregateOperator, CrossJoinOperator,
    DistinctOperator, ExitOperator, ExplainOperator, FunctionDatasetOperator, HeapSortOperator,
    InternalDatasetOperator, JoinOperator, LimitOperator, MorselDefragmentOperator, MorselStream,
    Operator, ProjectionOperator, ScannerOperator, SelectionOperator, ShowColumnsOperator,
    ShowCreateOperator, ShowDatabasesOperator, ShowFunctionsOperator, ShowVariablesOperator,
    SortOperator, UnionOperator,
};
use crate::samples;

pub struct PhysicalPlan {
    operators: Vec<Arc<dyn Operator>>,
    producers: Vec<Vec<usize>>,
    root: usize,
    output_schema: RelationSchema,
}

impl PhysicalPlan {
    fn empty() -> Self {
        Self {
            operators: Vec::new(),
            producers: Vec::new(),
            root: 0,
            output_schema: RelationSchema::new("result", Vec::new()),
        }
    }

    /// Add an operator instance; wiring that violates its declared arity is
    /// rejected here, at construction.
    fn add(&mut self, operator: Arc<dyn Operator>, producers: Vec<usize>) -> Result<usize> {
        if producers.len() != operator.producer_arity() {
            return Err(EngineError::Internal(format!(
                "{} expects {} producers, wired with {}",
                operator.name(),
                operator.producer_arity(),
                producers.len()
            )));
        }
        self.operators.push(operator);
        self.producers.push(producers);
        Ok(self.operators.len() - 1)
    }

    pub fn output_schema(&self) -> &RelationSchema {
        &self.output_schema
    }

    /// Pull-ready stream for the whole plan; every operator's stream is
    /// wrapped with a cancellation poll at batch boundaries.
    pub fn execute(&self, ctx: Arc<QueryContext>) -> Result<MorselStream> {
        self.build_stream(self.root, &ctx)
    }

    fn build_stream(&self, id: usize, ctx: &Arc<QueryContext>) -> Result<MorselStream> {
        let producer_streams = self.producers[id]
            .iter()
            .map(|producer| self.build_stream(*producer, ctx))
            .collect::<Result<Vec<_>>>()?;
        let operator = self.operators[id].clone();
        let stream = operator.execute(producer_streams, ctx.clone())?;
        Ok(cancellable(stream, ctx.token.clone()))
    }

    /// Rendered tree, root first, depth as indentation: (operator, config).
    pub fn render(&self) -> Vec<(String, String)> {
        fn visit(plan: &PhysicalPlan, id: usize, depth: usize, out: &mut Vec<(String, String)>) {
            let operator = &plan.operators[id];
            out.push((
                format!("{}{}", "  ".repeat(depth), operator.name()),
                operator.config(),
            ));
            for producer in &plan.producers[id] {
                visit(plan, *producer, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        visit(self, self.root, 0, &mut out);
        out
    }
}

pub fn create_physical_plan(plan: &LogicalPlan, config: &EngineConfig) -> Result<PhysicalPlan> {
    let mut physical = PhysicalPlan::empty();
    let (root, schema) = lower(plan, &mut physical, config)?;

    let identities = schema.identities();
    let query_columns: Vec<String> = schema
        .columns
        .iter()
        .map(|column| column.query_column.clone())
        .collect();
    let exit = physical.add(
        Arc::new(ExitOperator {
            identities,
            query_columns,
        }),
        vec![root],
    )?;
    physical.root = exit;
    physical.output_schema = schema;
    Ok(physical)
}

fn lower(
    plan: &LogicalPlan,
    out: &mut PhysicalPlan,
    config: &EngineConfig,
) -> Result<(usize, RelationSchema)> {
    match plan {
        LogicalPlan::Read(node) => {
            let schema = bound_schema(plan)?;
            if let Some(subplan) = &node.subplan {
                let (id, _) = lower(subplan, out, config)?;
                return Ok((id, schema));
            }
            if samples::is_sample(&node.relation) {
                let id = out.add(
                    Arc::new(InternalDatasetOperator {
                        relation: node.relation.clone(),
                        schema: schema.clone(),
                    }),
                    vec![],
                )?;
                return Ok((id, schema));
            }
            let scan = out.add(
                Arc::new(ScannerOperator {
                    relation: node.relation.clone(),
                    temporal: node.temporal,
                    schema: schema.clone(),
                }),
                vec![],
            )?;
            // blob scans emit one batch per blob; coalesce the fragments
            let defragment = out.add(
                Arc::new(MorselDefragmentOperator {
                    target_rows: config.morsel_target_rows,
                    floor_rows: config.defragment_floor_rows(),
                }),
                vec![scan],
            )?;
            Ok((defragment, schema))
        }

        LogicalPlan::FunctionDataset(node) => {
            let schema = bound_schema(plan)?;
            let dataset = out.add(
                Arc::new(FunctionDatasetOperator {
                    function: node.function,
                    args: node.args.clone(),
                    rows: node.rows.clone(),
                    schema: schema.clone(),
                }),
                vec![],
            )?;
            let defragment = out.add(
                Arc::new(MorselDefragmentOperator {
                    target_rows: config.morsel_target_rows,
                    floor_rows: config.defragment_floor_rows(),
                }),
                vec![dataset],
            )?;
            Ok((defragment, schema))
        }

        LogicalPlan::Filter(node) => {
            let (input, schema) = lower(&node.input, out, config)?;
            let id = out.add(
                Arc::new(SelectionOperator {
                    predicate: node.predicate.clone(),
                }),
                vec![input],
            )?;
            Ok((id, schema))
        }

        LogicalPlan::Project(node) => {
            let (input, _) = lower(&node.input, out, config)?;
            let schema = bound_schema(plan)?;
            let id = out.add(
                Arc::new(ProjectionOperator {
                    columns: node.columns.clone(),
                    identities: schema.identities(),
                }),
                vec![input],
            )?;
            Ok((id, schema))
        }

        LogicalPlan::Aggregate(node) => {
            let (input, _) = lower(&node.input, out, config)?;
            let schema = bound_schema(plan)?;
            let id = out.add(
                Arc::new(AggregateOperator {
                    aggregates: node.aggregates.clone(),
                }),
                vec![input],
            )?;
            Ok((id, schema))
        }

        LogicalPlan::AggregateAndGroup(node) => {
            let (input, _) = lower(&node.input, out, config)?;
            let schema = bound_schema(plan)?;
            let id = out.add(
                Arc::new(AggregateAndGroupOperator {
                    groups: node.groups.clone(),
                    aggregates: node.aggregates.clone(),
                }),
                vec![input],
            )?;
            Ok((id, schema))
        }

        LogicalPlan::Join(node) => lower_join(node, plan, out, config),

        LogicalPlan::Sort(node) => {
            let (input, schema) = lower(&node.input, out, config)?;
            let id = out.add(
                Arc::new(SortOperator {
                    keys: node.keys.clone(),
                }),
                vec![input],
            )?;
            Ok((id, schema))
        }

        LogicalPlan::Limit(node) => {
            // Sort directly below a small Limit fuses into a HeapSort
            if let (LogicalPlan::Sort(sort), Some(limit)) = (node.input.as_ref(), node.limit) {
                let k = limit + node.offset;
                if k <= config.heap_sort_threshold {
                    let (input, schema) = lower(&sort.input, out, config)?;
                    let heap = out.add(
                        Arc::new(HeapSortOperator {
                            keys: sort.keys.clone(),
                            k,
                        }),
                        vec![input],
                    )?;
                    let id = out.add(
                        Arc::new(LimitOperator {
                            limit: node.limit,
                            offset: node.offset,
                        }),
                        vec![heap],
                    )?;
                    return Ok((id, schema));
                }
            }
            let (input, schema) = lower(&node.input, out, config)?;
            let id = out.add(
                Arc::new(LimitOperator {
                    limit: node.limit,
                    offset: node.offset,
                }),
                vec![input],
            )?;
            Ok((id, schema))
        }

        LogicalPlan::Distinct(node) => {
            let (input, schema) = lower(&node.input, out, config)?;
            let on = if node.on.is_empty() {
                identifiers_for(&schema)
            } else {
                node.on.clone()
            };
            let id = out.add(Arc::new(DistinctOperator { on }), vec![input])?;
            Ok((id, schema))
        }

        LogicalPlan::Union(node) => {
            let (left, left_schema) = lower(&node.left, out, config)?;
            let (right, right_schema) = lower(&node.right, out, config)?;
            let schema = bound_schema(plan)?;
            let mut id = out.add(
                Arc::new(UnionOperator {
                    left_identities: left_schema.identities(),
                    right_identities: right_schema.identities(),
                }),
                vec![left, right],
            )?;
            if !node.all {
                id = out.add(
                    Arc::new(DistinctOperator {
                        on: identifiers_for(&schema),
                    }),
                    vec![id],
                )?;
            }
            Ok((id, schema))
        }

        LogicalPlan::Explain(node) => {
            // render, never execute
            let inner = create_physical_plan(&node.inner, config)?;
            let schema = introspection_schema(&[("operator", DataType::Varchar), ("config", DataType::Varchar)]);
            let id = out.add(
                Arc::new(ExplainOperator {
                    rows: inner.render(),
                    identities: schema.identities(),
                }),
                vec![],
            )?;
            Ok((id, schema))
        }

        LogicalPlan::ShowColumns(node) => {
            let target = node.schema.clone().ok_or_else(|| {
                EngineError::Internal("SHOW COLUMNS reached lowering unbound".to_string())
            })?;
            let mut columns = vec![("name", DataType::Varchar), ("type", DataType::Varchar)];
            if node.full {
                columns.push(("relation", DataType::Varchar));
            }
            let schema = introspection_schema(&columns);
            let id = out.add(
                Arc::new(ShowColumnsOperator {
                    target,
                    full: node.full,
                    identities: schema.identities(),
                }),
                vec![],
            )?;
            Ok((id, schema))
        }

        LogicalPlan::ShowCreate(node) => {
            let target = node.schema.clone().ok_or_else(|| {
                EngineError::Internal("SHOW CREATE reached lowering unbound".to_string())
            })?;
            let schema = introspection_schema(&[
                ("table", DataType::Varchar),
                ("create_table", DataType::Varchar),
            ]);
            let id = out.add(
                Arc::new(ShowCreateOperator {
                    target,
                    identities: schema.identities(),
                }),
                vec![],
            )?;
            Ok((id, schema))
        }

        LogicalPlan::ShowVariables => {
            let schema = introspection_schema(&[
                ("name", DataType::Varchar),
                ("value", DataType::Varchar),
            ]);
            let id = out.add(
                Arc::new(ShowVariablesOperator {
                    identities: schema.identities(),
                }),
                vec![],
            )?;
            Ok((id, schema))
        }

        LogicalPlan::ShowFunctions => {
            let schema = introspection_schema(&[
                ("function", DataType::Varchar),
                ("type", DataType::Varchar),
            ]);
            let id = out.add(
                Arc::new(ShowFunctionsOperator {
                    identities: schema.identities(),
                }),
                vec![],
            )?;
            Ok((id, schema))
        }

        LogicalPlan::ShowDatabases => {
            let schema = introspection_schema(&[("database", DataType::Varchar)]);
            let id = out.add(
                Arc::new(ShowDatabasesOperator {
                    identities: schema.identities(),
                }),
                vec![],
            )?;
            Ok((id, schema))
        }
    }
}

fn lower_join(
    node: &crate::logical_planner::Join,
    plan: &LogicalPlan,
    out: &mut PhysicalPlan,
    config: &EngineConfig,
) -> Result<(usize, RelationSchema)> {
    let schema = bound_schema(plan)?;

    if node.join_type == JoinType::Cross {
        // UNNEST on the right side expands against left rows
        if let LogicalPlan::FunctionDataset(dataset) = node.right.as_ref() {
            if dataset.function == DatasetFunction::Unnest
                && dataset
                    .args
                    .first()
                    .map(|arg| arg.binding.is_some())
                    .unwrap_or(false)
            {
                let target_identity = dataset
                    .schema
                    .as_ref()
                    .and_then(|s| s.columns.first())
                    .map(|c| c.identity.clone())
                    .ok_or_else(|| {
                        EngineError::Internal("unnest dataset bound without schema".to_string())
                    })?;
                let (left, _) = lower(&node.left, out, config)?;
                let id = out.add(
                    Arc::new(CrossJoinOperator {
                        mode: CrossJoinMode::Unnest {
                            source: dataset.args[0].clone(),
                            target_identity,
                        },
                        output_identities: schema.identities(),
                    }),
                    vec![left],
                )?;
                return Ok((id, schema));
            }
        }
        let (left, _) = lower(&node.left, out, config)?;
        let (right, _) = lower(&node.right, out, config)?;
        let id = out.add(
            Arc::new(CrossJoinOperator {
                mode: CrossJoinMode::Cartesian,
                output_identities: schema.identities(),
            }),
            vec![left, right],
        )?;
        return Ok((id, schema));
    }

    let (left, left_schema) = lower(&node.left, out, config)?;
    let (right, right_schema) = lower(&node.right, out, config)?;

    let mut keys = node.on.clone();
    for name in &node.using {
        let left_key = bound_identifier_for(&left_schema, name)?;
        let right_key = bound_identifier_for(&right_schema, name)?;
        keys.push((left_key, right_key));
    }
    if keys.is_empty() {
        return Err(EngineError::Sql(
            "JOIN requires an ON or USING condition".to_string(),
        ));
    }

    let id = out.add(
        Arc::new(JoinOperator {
            join_type: node.join_type,
            keys,
            output_identities: schema.identities(),
        }),
        vec![left, right],
    )?;
    Ok((id, schema))
}

fn bound_schema(plan: &LogicalPlan) -> Result<RelationSchema> {
    plan.schema().cloned().ok_or_else(|| {
        EngineError::Internal(format!(
            "{} reached the physical planner unbound",
            plan.node_name()
        ))
    })
}

/// Bound identifier expressions covering every column of a schema.
fn identifiers_for(schema: &RelationSchema) -> Vec<Expression> {
    schema
        .columns
        .iter()
        .map(|column| {
            let mut expression =
                Expression::identifier(column.relation.clone(), column.name.clone());
            expression.binding = Some(ColumnBinding {
                identity: column.identity.clone(),
                query_column: column.query_column.clone(),
                data_type: column.data_type,
            });
            expression
        })
        .collect()
}

fn bound_identifier_for(schema: &RelationSchema, name: &str) -> Result<Expression> {
    let matches = schema.find_columns(None, name);
    let column = matches.first().ok_or_else(|| {
        EngineError::column_not_found(name, schema.suggestion(name).as_deref())
    })?;
    let mut expression = Expression::identifier(column.relation.clone(), column.name.clone());
    expression.binding = Some(ColumnBinding {
        identity: column.identity.clone(),
        query_column: column.query_column.clone(),
        data_type: column.data_type,
    });
    Ok(expression)
}

fn introspection_schema(columns: &[(&str, DataType)]) -> RelationSchema {
    RelationSchema::new(
        "introspection",
        columns
            .iter()
            .map(|(name, data_type)| SchemaColumn::new(*name, *data_type))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::{bind, BindContext};
    use crate::logical_planner::plan_statement;
    use crate::parser;
    use crate::permissions::all_permissions;
    use crate::sql_rewriter::TemporalFilters;

    fn physical(sql: &str) -> PhysicalPlan {
        let statements = parser::parse(sql).unwrap();
        let planned =
            plan_statement(&statements[0], &TemporalFilters::new(), &all_permissions())
                .unwrap();
        let bound = bind(planned.plan, &BindContext::new(None)).unwrap();
        create_physical_plan(&bound, &EngineConfig::default()).unwrap()
    }

    fn operator_names(plan: &PhysicalPlan) -> Vec<String> {
        plan.render()
            .into_iter()
            .map(|(name, _)| name.trim_start().to_string())
            .collect()
    }

    #[test]
    fn test_exit_is_the_single_root() {
        let plan = physical("SELECT name FROM $planets");
        let names = operator_names(&plan);
        assert_eq!(names.first().map(String::as_str), Some("Exit"));
        assert_eq!(names.iter().filter(|n| *n == "Exit").count(), 1);
    }

    #[test]
    fn test_sort_limit_fuses_to_heap_sort() {
        let plan = physical("SELECT name FROM $planets ORDER BY name LIMIT 3");
        let names = operator_names(&plan);
        assert!(names.contains(&"HeapSort".to_string()), "{names:?}");
        assert!(!names.contains(&"Sort".to_string()));
    }

    #[test]
    fn test_large_limit_keeps_full_sort() {
        let plan = physical("SELECT name FROM $planets ORDER BY name LIMIT 5000");
        let names = operator_names(&plan);
        assert!(names.contains(&"Sort".to_string()), "{names:?}");
        assert!(!names.contains(&"HeapSort".to_string()));
    }

    #[test]
    fn test_explain_renders_without_executing() {
        let plan = physical("EXPLAIN SELECT name FROM $planets");
        let names = operator_names(&plan);
        assert!(names.contains(&"Explain".to_string()));
        assert!(!names.contains(&"InternalDataset".to_string()));
    }

    #[test]
    fn test_union_distinct_gets_distinct_operator() {
        let plan =
            physical("SELECT name FROM $planets UNION SELECT name FROM $planets");
        let names = operator_names(&plan);
        assert!(names.contains(&"Union".to_string()));
        assert!(names.contains(&"Distinct".to_string()));
    }
}
