//! Grouped aggregation.
//!
//! Greedy: concatenates all input batches, evaluates inner expressions and
//! group expressions as synthetic columns, appends the `*` column of ones,
//! groups by the declared keys, applies the aggregators per group, and
//! yields one batch. Groups appear in first-seen order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::{EngineError, Result};
use crate::expression::{aggregations, Expression};
use crate::morsel::{Array, Column, Datum, DatumKey, Morsel};
use crate::operators::aggregate::{aggregate_parts, prepare_aggregation_table};
use crate::operators::{
    drain_with_ceiling, lazy_batches, one_producer, MorselStream, Operator,
};

pub struct AggregateAndGroupOperator {
    pub groups: Vec<Expression>,
    pub aggregates: Vec<Expression>,
}

impl Operator for AggregateAndGroupOperator {
    fn name(&self) -> &'static str {
        "AggregateAndGroup"
    }

    fn config(&self) -> String {
        format!(
            "groups: {}; aggregates: {}",
            self.groups
                .iter()
                .map(|g| g.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            self.aggregates
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    fn is_greedy(&self) -> bool {
        true
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        let producer = one_producer(producers, self.name())?;
        let operator = self.clone();

        Ok(lazy_batches(move || {
            let batches = drain_with_ceiling(producer, ctx.config.max_materialized_bytes)?;
            let start = std::time::Instant::now();
            let table =
                prepare_aggregation_table(batches, &operator.aggregates, &operator.groups)?;

            // grouping an empty input yields no groups
            if table.num_rows() == 0 {
                return Ok(Vec::new());
            }

            let mut group_identities: Vec<String> = Vec::new();
            for group in &operator.groups {
                let identity = group.identity().ok_or_else(|| {
                    EngineError::Internal("group key reached execution unbound".to_string())
                })?;
                if !group_identities.contains(&identity.to_string()) {
                    group_identities.push(identity.to_string());
                }
            }

            // group rows, preserving first-seen order
            let mut group_index: HashMap<Vec<DatumKey>, usize> = HashMap::new();
            let mut group_rows: Vec<Vec<usize>> = Vec::new();
            for row in 0..table.num_rows() {
                let key = table.row_key(&group_identities, row);
                match group_index.get(&key) {
                    Some(index) => group_rows[*index].push(row),
                    None => {
                        group_index.insert(key, group_rows.len());
                        group_rows.push(vec![row]);
                    }
                }
            }

            let mut columns: Vec<Column> = Vec::new();
            for identity in &group_identities {
                let source = table.column(identity).ok_or_else(|| {
                    EngineError::Internal(format!("group column '{identity}' missing"))
                })?;
                let values: Vec<Datum> = group_rows
                    .iter()
                    .map(|rows| source.values.get(rows[0]))
                    .collect();
                columns.push(Column::new(
                    identity.clone(),
                    Array::infer_from_datums(values)?,
                ));
            }

            for aggregate in &operator.aggregates {
                let parts = aggregate_parts(aggregate)?;
                let source = table.column(&parts.input_identity).ok_or_else(|| {
                    EngineError::Internal(format!(
                        "aggregate input '{}' missing",
                        parts.input_identity
                    ))
                })?;
                let mut values = Vec::with_capacity(group_rows.len());
                for rows in &group_rows {
                    let group_values: Vec<Datum> =
                        rows.iter().map(|row| source.values.get(*row)).collect();
                    values.push(aggregations::apply(
                        &parts.name,
                        &group_values,
                        parts.distinct,
                        parts.order_ascending,
                        parts.limit,
                    )?);
                }
                columns.push(Column::new(
                    parts.output_identity,
                    Array::infer_from_datums(values)?,
                ));
            }

            ctx.statistics
                .record_elapsed(&ctx.statistics.time_aggregating_ns, start);
            Ok(vec![Morsel::new(columns)?])
        }))
    }
}
