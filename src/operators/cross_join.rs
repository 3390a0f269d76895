//! Cartesian product, and UNNEST expansion against the left side.
//!
//! In cartesian mode the right side is materialised and every left row is
//! paired with every right row, in left order. In unnest mode there is a
//! single producer: a bound list column (or list expression) on the left is
//! exploded into one row per element.

use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::{EngineError, Result};
use crate::expression::{evaluator, Expression};
use crate::morsel::{Array, Datum, Morsel};
use crate::operators::{
    drain_with_ceiling, lazy_batches, one_producer, two_producers, MorselStream, Operator,
};

pub enum CrossJoinMode {
    Cartesian,
    /// Expand a list-valued expression from the left side into rows
    Unnest {
        source: Expression,
        target_identity: String,
    },
}

pub struct CrossJoinOperator {
    pub mode: CrossJoinMode,
    pub output_identities: Vec<String>,
}

impl Operator for CrossJoinOperator {
    fn name(&self) -> &'static str {
        "CrossJoin"
    }

    fn config(&self) -> String {
        match &self.mode {
            CrossJoinMode::Cartesian => "cartesian".to_string(),
            CrossJoinMode::Unnest { source, .. } => format!("unnest {source}"),
        }
    }

    fn is_greedy(&self) -> bool {
        matches!(self.mode, CrossJoinMode::Cartesian)
    }

    fn producer_arity(&self) -> usize {
        match self.mode {
            CrossJoinMode::Cartesian => 2,
            CrossJoinMode::Unnest { .. } => 1,
        }
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        match &self.mode {
            CrossJoinMode::Cartesian => self.clone().cartesian(producers, ctx),
            CrossJoinMode::Unnest { .. } => self.clone().unnest(producers),
        }
    }
}

impl CrossJoinOperator {
    fn cartesian(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        let (left, right) = two_producers(producers, self.name())?;
        let operator = self.clone();

        Ok(lazy_batches(move || {
            let right_batches = drain_with_ceiling(right, ctx.config.max_materialized_bytes)?;
            let right_table = Morsel::concat(&right_batches)?;
            let right_rows = right_table.num_rows();

            let mut output = Vec::new();
            for batch in left {
                let batch = batch?;
                if right_rows == 0 || batch.num_rows() == 0 {
                    continue;
                }
                let mut left_indices = Vec::with_capacity(batch.num_rows() * right_rows);
                let mut right_indices = Vec::with_capacity(batch.num_rows() * right_rows);
                for row in 0..batch.num_rows() {
                    for right_row in 0..right_rows {
                        left_indices.push(Some(row));
                        right_indices.push(Some(right_row));
                    }
                }
                let mut combined = batch.take(&left_indices);
                for column in right_table.take(&right_indices).columns() {
                    combined =
                        combined.append_column(column.name.clone(), column.values.clone())?;
                }
                output.push(combined.select(&operator.output_identities)?);
            }
            Ok(output)
        }))
    }

    fn unnest(self: Arc<Self>, producers: Vec<MorselStream>) -> Result<MorselStream> {
        let producer = one_producer(producers, self.name())?;
        let (source, target_identity) = match &self.mode {
            CrossJoinMode::Unnest {
                source,
                target_identity,
            } => (source.clone(), target_identity.clone()),
            CrossJoinMode::Cartesian => {
                return Err(EngineError::Internal(
                    "unnest invoked in cartesian mode".to_string(),
                ))
            }
        };
        let operator = self.clone();

        let stream = producer
            .map(move |batch| -> Result<Option<Morsel>> {
                let batch = batch?;
                let lists = evaluator::evaluate(&source, &batch)?;
                let mut indices: Vec<Option<usize>> = Vec::new();
                let mut elements: Vec<Datum> = Vec::new();
                for row in 0..batch.num_rows() {
                    if let Datum::List(items) = lists.get(row) {
                        for item in items {
                            indices.push(Some(row));
                            elements.push(item);
                        }
                    }
                }
                if indices.is_empty() {
                    return Ok(None);
                }
                let expanded = batch
                    .take(&indices)
                    .append_column(target_identity.clone(), Array::infer_from_datums(elements)?)?;
                Ok(Some(expanded.select(&operator.output_identities)?))
            })
            .filter_map(|item| item.transpose());
        Ok(Box::new(stream))
    }
}
