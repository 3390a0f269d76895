//! Row filtering.
//!
//! Evaluates the predicate per batch and emits the mask-filtered sub-batch;
//! rows where the predicate is NULL are filtered out, and empty batches are
//! suppressed rather than emitted.

use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::Result;
use crate::expression::{evaluator, Expression};
use crate::morsel::Morsel;
use crate::operators::{one_producer, MorselStream, Operator};

pub struct SelectionOperator {
    pub predicate: Expression,
}

impl Operator for SelectionOperator {
    fn name(&self) -> &'static str {
        "Selection"
    }

    fn config(&self) -> String {
        self.predicate.to_string()
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        let producer = one_producer(producers, self.name())?;
        let operator = self.clone();
        let stream = producer
            .map(move |batch| -> Result<Option<Morsel>> {
                let batch = batch?;
                let start = std::time::Instant::now();
                let mask =
                    evaluator::boolean_mask(&evaluator::evaluate(&operator.predicate, &batch)?)?;
                let filtered = batch.filter(&mask);
                ctx.statistics
                    .record_elapsed(&ctx.statistics.time_evaluating_ns, start);
                if filtered.num_rows() == 0 {
                    Ok(None)
                } else {
                    Ok(Some(filtered))
                }
            })
            .filter_map(|item| item.transpose());
        Ok(Box::new(stream))
    }
}
