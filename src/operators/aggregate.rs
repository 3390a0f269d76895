//! Ungrouped aggregation.
//!
//! Greedy: concatenates its input, evaluates inner expressions so every
//! aggregator sees a materialised scalar column, and emits a single row.
//! `SELECT COUNT(*)` is short-circuited by summing batch row counts
//! without materialising anything.

use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::{EngineError, Result};
use crate::expression::{aggregations, evaluator, Expression, ExpressionKind, NodeType};
use crate::morsel::{Array, Column, Datum, Morsel};
use crate::operators::{
    drain_with_ceiling, lazy_batches, one_producer, MorselStream, Operator,
};

pub struct AggregateOperator {
    pub aggregates: Vec<Expression>,
}

/// The parts of an aggregator the operators act on.
pub(crate) struct AggregateParts {
    pub name: String,
    pub input_identity: String,
    pub output_identity: String,
    pub distinct: bool,
    pub order_ascending: Option<bool>,
    pub limit: Option<usize>,
}

pub(crate) fn aggregate_parts(aggregate: &Expression) -> Result<AggregateParts> {
    let (name, parameters, distinct, order_ascending, limit) = match &aggregate.kind {
        ExpressionKind::Aggregator {
            name,
            parameters,
            distinct,
            order_ascending,
            limit,
        } => (name, parameters, *distinct, *order_ascending, *limit),
        other => {
            return Err(EngineError::Internal(format!(
                "expected an aggregator, got {other:?}"
            )))
        }
    };
    let first = parameters
        .first()
        .ok_or_else(|| EngineError::Sql(format!("{name} expects an argument")))?;
    let input_identity = match &first.kind {
        ExpressionKind::Wildcard { .. } => "*".to_string(),
        _ => first
            .identity()
            .map(str::to_string)
            .ok_or_else(|| {
                EngineError::Internal(format!("{name} argument reached execution unbound"))
            })?,
    };
    let output_identity = aggregate
        .identity()
        .map(str::to_string)
        .ok_or_else(|| EngineError::Internal(format!("{name} bound without an identity")))?;
    // COUNT(DISTINCT x) is COUNT_DISTINCT
    let name = if distinct && name.eq_ignore_ascii_case("COUNT") {
        "COUNT_DISTINCT".to_string()
    } else {
        name.clone()
    };
    Ok(AggregateParts {
        name,
        input_identity,
        output_identity,
        distinct,
        order_ascending,
        limit,
    })
}

/// Concatenate input batches and materialise everything aggregation needs:
/// inner expression columns, group columns, and the synthetic `*` column
/// of ones.
pub(crate) fn prepare_aggregation_table(
    batches: Vec<Morsel>,
    aggregates: &[Expression],
    groups: &[Expression],
) -> Result<Morsel> {
    let mut table = Morsel::concat(&batches)?;

    if table.num_rows() > 0 {
        let mut evaluatable: Vec<&Expression> = Vec::new();
        for aggregate in aggregates {
            for parameter in aggregate.children() {
                if parameter.binding.is_some()
                    && parameter.node_type() != NodeType::Identifier
                {
                    evaluatable.push(parameter);
                }
            }
        }
        table = evaluator::evaluate_and_append(&evaluatable, table)?;
        let group_refs: Vec<&Expression> = groups.iter().collect();
        table = evaluator::evaluate_and_append(&group_refs, table)?;
    }

    if !table.has_column("*") {
        let ones = Array::Integer(vec![Some(1); table.num_rows()]);
        table = table.append_column("*", ones)?;
    }
    Ok(table)
}

/// Is this `SELECT COUNT(*)` with nothing else?
fn is_count_star(aggregates: &[Expression]) -> bool {
    if aggregates.len() != 1 {
        return false;
    }
    match &aggregates[0].kind {
        ExpressionKind::Aggregator {
            name, parameters, ..
        } => {
            name.eq_ignore_ascii_case("COUNT")
                && matches!(
                    parameters.first().map(|p| p.node_type()),
                    Some(NodeType::Wildcard)
                )
        }
        _ => false,
    }
}

impl Operator for AggregateOperator {
    fn name(&self) -> &'static str {
        "Aggregate"
    }

    fn config(&self) -> String {
        self.aggregates
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn is_greedy(&self) -> bool {
        true
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        let mut producer = one_producer(producers, self.name())?;
        let operator = self.clone();

        if is_count_star(&self.aggregates) {
            let identity = aggregate_parts(&self.aggregates[0])?.output_identity;
            return Ok(lazy_batches(move || {
                let mut count: i64 = 0;
                for batch in producer.by_ref() {
                    count += batch?.num_rows() as i64;
                }
                let morsel = Morsel::new(vec![Column::new(
                    identity.clone(),
                    Array::Integer(vec![Some(count)]),
                )])?;
                Ok(vec![morsel])
            }));
        }

        Ok(lazy_batches(move || {
            let batches = drain_with_ceiling(producer, ctx.config.max_materialized_bytes)?;
            let start = std::time::Instant::now();
            let table = prepare_aggregation_table(batches, &operator.aggregates, &[])?;

            let mut columns = Vec::with_capacity(operator.aggregates.len());
            for aggregate in &operator.aggregates {
                let parts = aggregate_parts(aggregate)?;
                let values: Vec<Datum> = match table.column(&parts.input_identity) {
                    Some(column) => column.values.iter().collect(),
                    None => Vec::new(),
                };
                let result = aggregations::apply(
                    &parts.name,
                    &values,
                    parts.distinct,
                    parts.order_ascending,
                    parts.limit,
                )?;
                columns.push(Column::new(
                    parts.output_identity,
                    Array::infer_from_datums(vec![result])?,
                ));
            }
            ctx.statistics
                .record_elapsed(&ctx.statistics.time_aggregating_ns, start);
            Ok(vec![Morsel::new(columns)?])
        }))
    }
}
