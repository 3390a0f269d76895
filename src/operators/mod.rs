//! The operator runtime.
//!
//! Operators implement a uniform pull interface: `execute` takes the
//! producer streams and returns a lazy, finite, non-restartable stream of
//! morsels. Greedy operators (Sort, the aggregations, the build side of
//! Join) drain their upstream before their first batch — behind a lazy
//! wrapper, so an unpulled root never consumes its producers. The driver
//! wraps every stream with a cancellation check between batch emissions.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::context::{CancellationToken, QueryContext};
use crate::errors::{EngineError, Result};
use crate::morsel::{Array, Column, Morsel};

pub mod aggregate;
pub mod aggregate_and_group;
pub mod cross_join;
pub mod distinct;
pub mod exit;
pub mod explain;
pub mod function_dataset;
pub mod heap_sort;
pub mod internal_dataset;
pub mod join;
pub mod limit;
pub mod morsel_defragment;
pub mod projection;
pub mod scanner;
pub mod selection;
pub mod show_columns;
pub mod show_create;
pub mod show_databases;
pub mod show_functions;
pub mod show_variables;
pub mod sort;
pub mod union;

pub use aggregate::AggregateOperator;
pub use aggregate_and_group::AggregateAndGroupOperator;
pub use cross_join::CrossJoinOperator;
pub use distinct::DistinctOperator;
pub use exit::ExitOperator;
pub use explain::ExplainOperator;
pub use function_dataset::FunctionDatasetOperator;
pub use heap_sort::HeapSortOperator;
pub use internal_dataset::InternalDatasetOperator;
pub use join::JoinOperator;
pub use limit::LimitOperator;
pub use morsel_defragment::MorselDefragmentOperator;
pub use projection::ProjectionOperator;
pub use scanner::ScannerOperator;
pub use selection::SelectionOperator;
pub use show_columns::ShowColumnsOperator;
pub use show_create::ShowCreateOperator;
pub use show_databases::ShowDatabasesOperator;
pub use show_functions::ShowFunctionsOperator;
pub use show_variables::ShowVariablesOperator;
pub use sort::SortOperator;
pub use union::UnionOperator;

/// A finite, non-restartable stream of morsels.
pub type MorselStream = Box<dyn Iterator<Item = Result<Morsel>>>;

pub trait Operator: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-line configuration description, shown by EXPLAIN.
    fn config(&self) -> String {
        String::new()
    }

    /// Greedy operators fully consume their upstream before emitting; this
    /// is load-bearing for backpressure reasoning, keep it accurate.
    fn is_greedy(&self) -> bool {
        false
    }

    fn producer_arity(&self) -> usize {
        1
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        ctx: Arc<QueryContext>,
    ) -> Result<MorselStream>;
}

// ---------------------------------------------------------------------------
// producer plumbing

pub fn one_producer(mut producers: Vec<MorselStream>, name: &str) -> Result<MorselStream> {
    if producers.len() != 1 {
        return Err(EngineError::Internal(format!(
            "{name} expects a single producer, got {}",
            producers.len()
        )));
    }
    Ok(producers.remove(0))
}

pub fn two_producers(
    mut producers: Vec<MorselStream>,
    name: &str,
) -> Result<(MorselStream, MorselStream)> {
    if producers.len() != 2 {
        return Err(EngineError::Internal(format!(
            "{name} expects two producers, got {}",
            producers.len()
        )));
    }
    let right = producers.remove(1);
    let left = producers.remove(0);
    Ok((left, right))
}

pub fn no_producers(producers: Vec<MorselStream>, name: &str) -> Result<()> {
    if !producers.is_empty() {
        return Err(EngineError::Internal(format!(
            "{name} expects no producers, got {}",
            producers.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// stream adapters

struct CancellableStream {
    inner: MorselStream,
    token: CancellationToken,
    finished: bool,
}

impl Iterator for CancellableStream {
    type Item = Result<Morsel>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Err(cancelled) = self.token.check() {
            self.finished = true;
            return Some(Err(cancelled));
        }
        match self.inner.next() {
            Some(Err(error)) => {
                self.finished = true;
                Some(Err(error))
            }
            other => other,
        }
    }
}

/// Cancellation is polled at every batch boundary; an operator's internal
/// loop is uninterruptible within a batch.
pub fn cancellable(stream: MorselStream, token: CancellationToken) -> MorselStream {
    Box::new(CancellableStream {
        inner: stream,
        token,
        finished: false,
    })
}

type BatchThunk = Box<dyn FnOnce() -> Result<Vec<Morsel>>>;

struct LazyBatches {
    thunk: Option<BatchThunk>,
    queue: VecDeque<Morsel>,
    failed: bool,
}

impl Iterator for LazyBatches {
    type Item = Result<Morsel>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(thunk) = self.thunk.take() {
            match thunk() {
                Ok(batches) => self.queue = batches.into(),
                Err(error) => {
                    self.failed = true;
                    return Some(Err(error));
                }
            }
        }
        self.queue.pop_front().map(Ok)
    }
}

/// Defer a greedy computation until the consumer first pulls, so an
/// unpulled stream never drains its upstream.
pub fn lazy_batches(thunk: impl FnOnce() -> Result<Vec<Morsel>> + 'static) -> MorselStream {
    Box::new(LazyBatches {
        thunk: Some(Box::new(thunk)),
        queue: VecDeque::new(),
        failed: false,
    })
}

pub fn empty_stream() -> MorselStream {
    Box::new(std::iter::empty())
}

pub fn single_batch(morsel: Morsel) -> MorselStream {
    Box::new(std::iter::once(Ok(morsel)))
}

/// Drain a producer with the greedy-operator memory ceiling applied.
pub fn drain_with_ceiling(stream: MorselStream, ceiling: u64) -> Result<Vec<Morsel>> {
    let mut batches = Vec::new();
    let mut bytes: u64 = 0;
    for batch in stream {
        let batch = batch?;
        bytes += batch.nbytes();
        if bytes > ceiling {
            return Err(EngineError::OutOfMemory(ceiling));
        }
        batches.push(batch);
    }
    Ok(batches)
}

/// Rename a source morsel's columns onto plan identities: schema columns
/// are matched by source name, missing ones become nulls, unknown source
/// columns are dropped.
pub fn align_to_schema(
    morsel: &Morsel,
    schema: &crate::catalogue::RelationSchema,
) -> Result<Morsel> {
    let mut columns = Vec::with_capacity(schema.columns.len());
    for schema_column in &schema.columns {
        let values = morsel
            .columns()
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&schema_column.name))
            .map(|c| c.values.clone())
            .unwrap_or(Array::Null(morsel.num_rows()));
        columns.push(Column::new(schema_column.identity.clone(), values));
    }
    Morsel::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: i64) -> Morsel {
        Morsel::new(vec![Column::new(
            "x",
            Array::Integer((0..n).map(Some).collect()),
        )])
        .unwrap()
    }

    #[test]
    fn test_lazy_batches_defers_work() {
        let ran = std::rc::Rc::new(std::cell::Cell::new(false));
        let flag = ran.clone();
        let mut stream = lazy_batches(move || {
            flag.set(true);
            Ok(vec![batch(2)])
        });
        assert!(!ran.get());
        assert!(stream.next().is_some());
        assert!(ran.get());
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_cancelled_stream_terminates_with_error() {
        let token = CancellationToken::new(None);
        token.cancel();
        let mut stream = cancellable(single_batch(batch(1)), token);
        assert!(matches!(
            stream.next(),
            Some(Err(EngineError::Cancelled { .. }))
        ));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_drain_with_ceiling_raises_out_of_memory() {
        let stream: MorselStream = Box::new(vec![Ok(batch(1000)), Ok(batch(1000))].into_iter());
        let result = drain_with_ceiling(stream, 100);
        assert!(matches!(result, Err(EngineError::OutOfMemory(_))));
    }
}
