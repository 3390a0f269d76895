//! Morsel defragmentation.
//!
//! Scanners emit one batch per blob, which can be tiny. This operator
//! coalesces fragments into batches of the target size and passes
//! already-large batches straight through.

use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::Result;
use crate::morsel::Morsel;
use crate::operators::{one_producer, MorselStream, Operator};

pub struct MorselDefragmentOperator {
    pub target_rows: usize,
    pub floor_rows: usize,
}

struct DefragmentStream {
    producer: MorselStream,
    target_rows: usize,
    floor_rows: usize,
    buffer: Vec<Morsel>,
    buffered_rows: usize,
    exhausted: bool,
    finished: bool,
}

impl DefragmentStream {
    fn flush(&mut self) -> Result<Option<Morsel>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let combined = Morsel::concat(&std::mem::take(&mut self.buffer))?;
        self.buffered_rows = 0;
        if combined.num_rows() > self.target_rows {
            let emit = combined.slice(0, self.target_rows);
            let rest = combined.slice(self.target_rows, combined.num_rows() - self.target_rows);
            self.buffered_rows = rest.num_rows();
            self.buffer.push(rest);
            Ok(Some(emit))
        } else {
            Ok(Some(combined))
        }
    }
}

impl Iterator for DefragmentStream {
    type Item = Result<Morsel>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if self.exhausted {
                return match self.flush() {
                    Ok(Some(batch)) => Some(Ok(batch)),
                    Ok(None) => {
                        self.finished = true;
                        None
                    }
                    Err(error) => {
                        self.finished = true;
                        Some(Err(error))
                    }
                };
            }
            match self.producer.next() {
                Some(Ok(batch)) => {
                    if batch.num_rows() >= self.floor_rows && self.buffer.is_empty() {
                        return Some(Ok(batch));
                    }
                    self.buffered_rows += batch.num_rows();
                    self.buffer.push(batch);
                    if self.buffered_rows >= self.target_rows {
                        match self.flush() {
                            Ok(Some(batch)) => return Some(Ok(batch)),
                            Ok(None) => continue,
                            Err(error) => {
                                self.finished = true;
                                return Some(Err(error));
                            }
                        }
                    }
                }
                Some(Err(error)) => {
                    self.finished = true;
                    return Some(Err(error));
                }
                None => self.exhausted = true,
            }
        }
    }
}

impl Operator for MorselDefragmentOperator {
    fn name(&self) -> &'static str {
        "MorselDefragment"
    }

    fn config(&self) -> String {
        format!("target {} rows", self.target_rows)
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        _ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        let producer = one_producer(producers, self.name())?;
        Ok(Box::new(DefragmentStream {
            producer,
            target_rows: self.target_rows,
            floor_rows: self.floor_rows,
            buffer: Vec::new(),
            buffered_rows: 0,
            exhausted: false,
            finished: false,
        }))
    }
}
