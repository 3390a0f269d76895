//! Global sort.
//!
//! Greedy: drains and concatenates the input, materialises any computed
//! key columns, then performs a stable sort over the (identity, direction)
//! key list; rows with equal keys keep their input order. Nulls sort last.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::{EngineError, Result};
use crate::expression::{evaluator, Expression};
use crate::logical_planner::Direction;
use crate::morsel::Morsel;
use crate::operators::{
    drain_with_ceiling, lazy_batches, one_producer, MorselStream, Operator,
};

pub struct SortOperator {
    pub keys: Vec<(Expression, Direction)>,
}

/// Materialise key columns and compare two rows of one table.
pub(crate) fn ensure_key_columns(
    table: Morsel,
    keys: &[(Expression, Direction)],
) -> Result<Morsel> {
    let expressions: Vec<&Expression> = keys.iter().map(|(key, _)| key).collect();
    evaluator::evaluate_and_append(&expressions, table)
}

pub(crate) fn key_identities(keys: &[(Expression, Direction)]) -> Result<Vec<(String, Direction)>> {
    keys.iter()
        .map(|(key, direction)| {
            key.identity()
                .map(|identity| (identity.to_string(), *direction))
                .ok_or_else(|| {
                    EngineError::Internal("sort key reached execution unbound".to_string())
                })
        })
        .collect()
}

pub(crate) fn compare_rows(
    table: &Morsel,
    keys: &[(String, Direction)],
    a: usize,
    b: usize,
) -> Ordering {
    for (identity, direction) in keys {
        let column = match table.column(identity) {
            Some(column) => column,
            None => continue,
        };
        let ordering = column.values.get(a).sort_cmp(&column.values.get(b));
        let ordering = match direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl Operator for SortOperator {
    fn name(&self) -> &'static str {
        "Sort"
    }

    fn config(&self) -> String {
        self.keys
            .iter()
            .map(|(key, direction)| {
                format!(
                    "{key} {}",
                    if *direction == Direction::Ascending {
                        "ASC"
                    } else {
                        "DESC"
                    }
                )
            })
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
        let producer = one_producer(producers, self.name())?;
        let operator = self.clone();

        Ok(lazy_batches(move || {
            let batches = drain_with_ceiling(producer, ctx.config.max_materialized_bytes)?;
            let start = std::time::Instant::now();
            let table = Morsel::concat(&batches)?;
            if table.num_rows() == 0 {
                return Ok(vec![table]);
            }
            let table = ensure_key_columns(table, &operator.keys)?;
            let identities = key_identities(&operator.keys)?;

            let mut order: Vec<usize> = (0..table.num_rows()).collect();
            order.sort_by(|a, b| compare_rows(&table, &identities, *a, *b));

            let indices: Vec<Option<usize>> = order.into_iter().map(Some).collect();
            let sorted = table.take(&indices);
            ctx.statistics
                .record_elapsed(&ctx.statistics.time_sorting_ns, start);
            Ok(vec![sorted])
        }))
    }
}
