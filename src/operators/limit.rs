//! LIMIT/OFFSET.
//!
//! Emits at most `limit` rows starting at `offset`, and stops pulling its
//! producer once satisfied; `LIMIT 0` never pulls at all.

use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::Result;
use crate::morsel::Morsel;
use crate::operators::{one_producer, MorselStream, Operator};

pub struct LimitOperator {
    pub limit: Option<usize>,
    pub offset: usize,
}

struct LimitStream {
    producer: MorselStream,
    to_skip: usize,
    remaining: Option<usize>,
    finished: bool,
}

impl Iterator for LimitStream {
    type Item = Result<Morsel>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.remaining == Some(0) {
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

            let batch = if self.to_skip > 0 {
                let skip = self.to_skip.min(batch.num_rows());
                self.to_skip -= skip;
                batch.slice(skip, batch.num_rows() - skip)
            } else {
                batch
            };
            if batch.num_rows() == 0 {
                continue;
            }

            return match self.remaining {
                Some(remaining) if batch.num_rows() >= remaining => {
                    self.remaining = Some(0);
                    Some(Ok(batch.slice(0, remaining)))
                }
                Some(remaining) => {
                    self.remaining = Some(remaining - batch.num_rows());
                    Some(Ok(batch))
                }
                None => Some(Ok(batch)),
            };
        }
    }
}

impl Operator for LimitOperator {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn config(&self) -> String {
        match self.limit {
            Some(limit) => format!("limit {limit} offset {}", self.offset),
            None => format!("offset {}", self.offset),
        }
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        _ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        let producer = one_producer(producers, self.name())?;
        Ok(Box::new(LimitStream {
            producer,
            to_skip: self.offset,
            remaining: self.limit,
            finished: false,
        }))
    }
}
