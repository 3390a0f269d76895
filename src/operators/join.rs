//! Hash join.
//!
//! Materialises the right side (greedy build), then streams the left,
//! emitting joined batches in the order the left side supplies them.
//! INNER, LEFT/RIGHT/FULL OUTER, LEFT SEMI and LEFT ANTI are supported;
//! `USING` (INNER and LEFT OUTER only) coalesces the key columns.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::{EngineError, Result};
use crate::expression::{evaluator, Expression};
use crate::logical_planner::JoinType;
use crate::morsel::{DatumKey, Morsel};
use crate::operators::{lazy_batches, two_producers, MorselStream, Operator};
use crate::operators::drain_with_ceiling;

pub struct JoinOperator {
    pub join_type: JoinType,
    /// Key expression pairs, left side first
    pub keys: Vec<(Expression, Expression)>,
    /// Identities the joined batch exposes, in output order
    pub output_identities: Vec<String>,
}

impl JoinOperator {
    fn left_key_identities(&self) -> Result<Vec<String>> {
        self.keys
            .iter()
            .map(|(left, _)| {
                left.identity().map(str::to_string).ok_or_else(|| {
                    EngineError::Internal("join key reached execution unbound".to_string())
                })
            })
            .collect()
    }

    fn right_key_identities(&self) -> Result<Vec<String>> {
        self.keys
            .iter()
            .map(|(_, right)| {
                right.identity().map(str::to_string).ok_or_else(|| {
                    EngineError::Internal("join key reached execution unbound".to_string())
                })
            })
            .collect()
    }
}

impl Operator for JoinOperator {
    fn name(&self) -> &'static str {
        "Join"
    }

    fn config(&self) -> String {
        format!(
            "{} on {}",
            self.join_type,
            self.keys
                .iter()
                .map(|(l, r)| format!("{l} = {r}"))
                .collect::<Vec<_>>()
                .join(" AND ")
        )
    }

    /// The build side is greedy; the probe side streams.
    fn is_greedy(&self) -> bool {
        true
    }

    fn producer_arity(&self) -> usize {
        2
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        let (left, right) = two_producers(producers, self.name())?;
        let operator = self.clone();

        Ok(lazy_batches(move || {
            let start = std::time::Instant::now();

            // build: materialise the right side and hash its keys
            let right_batches = drain_with_ceiling(right, ctx.config.max_materialized_bytes)?;
            let mut right_table = Morsel::concat(&right_batches)?;
            let right_keys = operator.right_key_identities()?;
            if right_table.num_rows() > 0 {
                let key_exprs: Vec<&Expression> =
                    operator.keys.iter().map(|(_, r)| r).collect();
                right_table = evaluator::evaluate_and_append(&key_exprs, right_table)?;
            }
            let mut build: HashMap<Vec<DatumKey>, Vec<usize>> = HashMap::new();
            for row in 0..right_table.num_rows() {
                let key = right_table.row_key(&right_keys, row);
                // SQL equality: a null key never matches anything
                if key.iter().any(|part| *part == DatumKey::Null) {
                    continue;
                }
                build.entry(key).or_default().push(row);
            }
            let mut right_matched = vec![false; right_table.num_rows()];

            // probe: stream the left side in order
            let left_keys = operator.left_key_identities()?;
            let mut output: Vec<Morsel> = Vec::new();
            for batch in left {
                let batch = batch?;
                let key_exprs: Vec<&Expression> =
                    operator.keys.iter().map(|(l, _)| l).collect();
                let batch = evaluator::evaluate_and_append(&key_exprs, batch)?;

                let mut left_indices: Vec<Option<usize>> = Vec::new();
                let mut right_indices: Vec<Option<usize>> = Vec::new();
                for row in 0..batch.num_rows() {
                    let key = batch.row_key(&left_keys, row);
                    let matches = if key.iter().any(|part| *part == DatumKey::Null) {
                        None
                    } else {
                        build.get(&key)
                    };
                    match operator.join_type {
                        JoinType::LeftSemi => {
                            if matches.is_some() {
                                left_indices.push(Some(row));
                                right_indices.push(None);
                            }
                        }
                        JoinType::LeftAnti => {
                            if matches.is_none() {
                                left_indices.push(Some(row));
                                right_indices.push(None);
                            }
                        }
                        _ => match matches {
                            Some(matches) => {
                                for matched in matches {
                                    right_matched[*matched] = true;
                                    left_indices.push(Some(row));
                                    right_indices.push(Some(*matched));
                                }
                            }
                            None => {
                                if matches!(
                                    operator.join_type,
                                    JoinType::LeftOuter | JoinType::FullOuter
                                ) {
                                    left_indices.push(Some(row));
                                    right_indices.push(None);
                                }
                            }
                        },
                    }
                }

                if !left_indices.is_empty() {
                    output.push(operator.combine(
                        &batch,
                        &right_table,
                        &left_indices,
                        &right_indices,
                    )?);
                }
            }

            // unmatched build rows for RIGHT/FULL OUTER, with a null left
            if matches!(
                operator.join_type,
                JoinType::RightOuter | JoinType::FullOuter
            ) {
                let unmatched: Vec<Option<usize>> = right_matched
                    .iter()
                    .enumerate()
                    .filter(|(_, matched)| !**matched)
                    .map(|(row, _)| Some(row))
                    .collect();
                if !unmatched.is_empty() {
                    let left_nulls: Vec<Option<usize>> = vec![None; unmatched.len()];
                    // an empty left batch still knows its column layout via
                    // the output identity selection
                    let empty_left = Morsel::empty();
                    output.push(operator.combine(
                        &empty_left,
                        &right_table,
                        &left_nulls,
                        &unmatched,
                    )?);
                }
            }

            ctx.statistics
                .record_elapsed(&ctx.statistics.time_joining_ns, start);
            Ok(output)
        }))
    }
}

impl JoinOperator {
    fn combine(
        &self,
        left: &Morsel,
        right: &Morsel,
        left_indices: &[Option<usize>],
        right_indices: &[Option<usize>],
    ) -> Result<Morsel> {
        let left_taken = left.take(left_indices);
        let right_taken = right.take(right_indices);
        let mut combined = left_taken;
        for column in right_taken.columns() {
            if !combined.has_column(&column.name) {
                combined = combined.append_column(column.name.clone(), column.values.clone())?;
            }
        }
        // null columns for identities neither side carries (outer padding)
        for identity in &self.output_identities {
            if !combined.has_column(identity) {
                combined = combined.append_column(
                    identity.clone(),
                    crate::morsel::Array::Null(left_indices.len()),
                )?;
            }
        }
        combined.select(&self.output_identities)
    }
}
