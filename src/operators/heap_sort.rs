//! Top-K sort with bounded memory.
//!
//! Consumes the input batch by batch, keeping at most K rows sorted at any
//! time; ties break by insertion order (the stable sort over accumulated
//! rows preserves it). The output never exceeds K rows, and K larger than
//! the input degenerates to a stable full sort.

use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::Result;
use crate::expression::Expression;
use crate::logical_planner::Direction;
use crate::morsel::Morsel;
use crate::operators::sort::{compare_rows, ensure_key_columns, key_identities};
use crate::operators::{lazy_batches, one_producer, MorselStream, Operator};

pub struct HeapSortOperator {
    pub keys: Vec<(Expression, Direction)>,
    pub k: usize,
}

impl Operator for HeapSortOperator {
    fn name(&self) -> &'static str {
        "HeapSort"
    }

    fn config(&self) -> String {
        format!("top {}", self.k)
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        let producer = one_producer(producers, self.name())?;
        let operator = self.clone();

        if self.k == 0 {
            // nothing to produce, and nothing to pull
            return Ok(crate::operators::empty_stream());
        }

        Ok(lazy_batches(move || {
            let start = std::time::Instant::now();
            let identities = key_identities(&operator.keys)?;
            let mut accumulated: Option<Morsel> = None;

            for batch in producer {
                let batch = ensure_key_columns(batch?, &operator.keys)?;
                let combined = match accumulated.take() {
                    Some(accumulated) => Morsel::concat(&[accumulated, batch])?,
                    None => batch,
                };
                let mut order: Vec<usize> = (0..combined.num_rows()).collect();
                order.sort_by(|a, b| compare_rows(&combined, &identities, *a, *b));
                order.truncate(operator.k);
                let indices: Vec<Option<usize>> = order.into_iter().map(Some).collect();
                accumulated = Some(combined.take(&indices));
            }

            ctx.statistics
                .record_elapsed(&ctx.statistics.time_sorting_ns, start);
            match accumulated {
                Some(result) => Ok(vec![result]),
                None => Ok(Vec::new()),
            }
        }))
    }
}
