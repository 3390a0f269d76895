//! DISTINCT.
//!
//! Streams with a hash set over the projected-identity tuple, keeping the
//! first occurrence in scan order. Missing tuple columns (computed
//! expressions) are materialised before hashing.

use std::collections::HashSet;
use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::Result;
use crate::expression::{evaluator, Expression};
use crate::morsel::{DatumKey, Morsel};
use crate::operators::{one_producer, MorselStream, Operator};

pub struct DistinctOperator {
    pub on: Vec<Expression>,
}

struct DistinctStream {
    producer: MorselStream,
    on: Vec<Expression>,
    identities: Vec<String>,
    seen: HashSet<Vec<DatumKey>>,
    finished: bool,
}

impl Iterator for DistinctStream {
    type Item = Result<Morsel>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let batch = match self.producer.next() {
                Some(Ok(batch)) => batch,
                Some(Err(error)) => {
                    self.finished = true;
                    return Some(Err(error));
                }
                None => return None,
            };

            let expressions: Vec<&Expression> = self.on.iter().collect();
            let batch = match evaluator::evaluate_and_append(&expressions, batch) {
                Ok(batch) => batch,
                Err(error) => {
                    self.finished = true;
                    return Some(Err(error));
                }
            };

            let mask: Vec<bool> = (0..batch.num_rows())
                .map(|row| self.seen.insert(batch.row_key(&self.identities, row)))
                .collect();
            let filtered = batch.filter(&mask);
            if filtered.num_rows() > 0 {
                return Some(Ok(filtered));
            }
        }
    }
}

impl Operator for DistinctOperator {
    fn name(&self) -> &'static str {
        "Distinct"
    }

    fn config(&self) -> String {
        self.on
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        _ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        let producer = one_producer(producers, self.name())?;
        let identities = self
            .on
            .iter()
            .filter_map(|expression| expression.identity().map(str::to_string))
            .collect();
        Ok(Box::new(DistinctStream {
            producer,
            on: self.on.clone(),
            identities,
            seen: HashSet::new(),
            finished: false,
        }))
    }
}
