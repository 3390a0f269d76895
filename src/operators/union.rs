//! UNION [ALL].
//!
//! Streams the left branch, then the right branch with its columns mapped
//! positionally onto the left branch's identities. UNION DISTINCT is this
//! operator with a Distinct stacked above it by the physical planner.

use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::Result;
use crate::morsel::Morsel;
use crate::operators::{two_producers, MorselStream, Operator};

pub struct UnionOperator {
    pub left_identities: Vec<String>,
    pub right_identities: Vec<String>,
}

struct UnionStream {
    left: Option<MorselStream>,
    right: Option<MorselStream>,
    left_identities: Vec<String>,
    right_identities: Vec<String>,
    finished: bool,
}

impl Iterator for UnionStream {
    type Item = Result<Morsel>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Some(left) = &mut self.left {
            match left.next() {
                Some(Ok(batch)) => return Some(Ok(batch)),
                Some(Err(error)) => {
                    self.finished = true;
                    return Some(Err(error));
                }
                None => self.left = None,
            }
        }
        if let Some(right) = &mut self.right {
            match right.next() {
                Some(Ok(batch)) => {
                    let mapped = batch
                        .select(&self.right_identities)
                        .and_then(|selected| selected.rename_columns(&self.left_identities));
                    match mapped {
                        Ok(batch) => return Some(Ok(batch)),
                        Err(error) => {
                            self.finished = true;
                            return Some(Err(error));
                        }
                    }
                }
                Some(Err(error)) => {
                    self.finished = true;
                    return Some(Err(error));
                }
                None => self.right = None,
            }
        }
        None
    }
}

impl Operator for UnionOperator {
    fn name(&self) -> &'static str {
        "Union"
    }

    fn producer_arity(&self) -> usize {
        2
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        _ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        let (left, right) = two_producers(producers, self.name())?;
        Ok(Box::new(UnionStream {
            left: Some(left),
            right: Some(right),
            left_identities: self.left_identities.clone(),
            right_identities: self.right_identities.clone(),
            finished: false,
        }))
    }
}
