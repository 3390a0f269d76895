//! Per-query state.
//!
//! A [`QueryContext`] travels with every operator of one query: statistics
//! (shared by reference), the permission set, the cache handle, the engine
//! configuration, and the cancellation token. Nothing here is shared
//! between queries; the only process-wide state is the catalogue and the
//! function registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::cache::KeyValueStore;
use crate::config::EngineConfig;
use crate::errors::{EngineError, Result};
use crate::morsel::Datum;
use crate::permissions::Permission;

/// Per-query counters. One instance per cursor, shared by reference across
/// every operator in the plan.
#[derive(Default)]
pub struct QueryStatistics {
    pub time_planning_ns: AtomicU64,
    pub time_reading_ns: AtomicU64,
    pub time_evaluating_ns: AtomicU64,
    pub time_aggregating_ns: AtomicU64,
    pub time_sorting_ns: AtomicU64,
    pub time_joining_ns: AtomicU64,
    pub rows_read: AtomicU64,
    pub columns_read: AtomicU64,
    pub blobs_read: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    messages: Mutex<Vec<String>>,
}

impl QueryStatistics {
    pub fn add(&self, counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn record_elapsed(&self, counter: &AtomicU64, since: Instant) {
        counter.fetch_add(since.elapsed().as_nanos() as u64, Ordering::Relaxed);
    }

    /// Run-time warning surfaced through `cursor.messages()`.
    pub fn message(&self, text: impl Into<String>) {
        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        messages.push(text.into());
    }

    pub fn messages(&self) -> Vec<String> {
        let messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        messages.clone()
    }

    pub fn as_map(&self) -> BTreeMap<String, u64> {
        let mut map = BTreeMap::new();
        let mut put = |name: &str, counter: &AtomicU64| {
            map.insert(name.to_string(), counter.load(Ordering::Relaxed));
        };
        put("time_planning_ns", &self.time_planning_ns);
        put("time_reading_ns", &self.time_reading_ns);
        put("time_evaluating_ns", &self.time_evaluating_ns);
        put("time_aggregating_ns", &self.time_aggregating_ns);
        put("time_sorting_ns", &self.time_sorting_ns);
        put("time_joining_ns", &self.time_joining_ns);
        put("rows_read", &self.rows_read);
        put("columns_read", &self.columns_read);
        put("blobs_read", &self.blobs_read);
        put("cache_hits", &self.cache_hits);
        put("cache_misses", &self.cache_misses);
        map
    }
}

/// Cooperative cancellation: a shared flag plus an optional deadline, polled
/// by every operator between batch emissions.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    started: Instant,
    deadline: Option<Duration>,
}

impl CancellationToken {
    pub fn new(deadline: Option<Duration>) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Trip check; past the deadline the token behaves as cancelled.
    pub fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled {
                elapsed: self.elapsed(),
            });
        }
        if let Some(deadline) = self.deadline {
            if self.started.elapsed() > deadline {
                self.cancelled.store(true, Ordering::Relaxed);
                return Err(EngineError::Cancelled {
                    elapsed: self.elapsed(),
                });
            }
        }
        Ok(())
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new(None)
    }
}

pub struct QueryContext {
    pub qid: String,
    pub statistics: Arc<QueryStatistics>,
    pub token: CancellationToken,
    pub cache: Option<Arc<dyn KeyValueStore>>,
    pub config: EngineConfig,
    pub permissions: std::collections::HashSet<Permission>,
    /// Connection variables, snapshotted for SHOW VARIABLES
    pub variables: HashMap<String, Datum>,
}

impl QueryContext {
    pub fn new(
        cache: Option<Arc<dyn KeyValueStore>>,
        config: EngineConfig,
        permissions: std::collections::HashSet<Permission>,
        variables: HashMap<String, Datum>,
        deadline: Option<Duration>,
    ) -> Self {
        Self {
            qid: Uuid::new_v4().to_string(),
            statistics: Arc::new(QueryStatistics::default()),
            token: CancellationToken::new(deadline),
            cache,
            config,
            permissions,
            variables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_roundtrip() {
        let statistics = QueryStatistics::default();
        statistics.add(&statistics.rows_read, 9);
        statistics.add(&statistics.rows_read, 1);
        statistics.message("something to know");
        assert_eq!(statistics.as_map()["rows_read"], 10);
        assert_eq!(statistics.messages(), vec!["something to know".to_string()]);
    }

    #[test]
    fn test_cancellation_token_trips_once_cancelled() {
        let token = CancellationToken::new(None);
        assert!(token.check().is_ok());
        token.cancel();
        assert!(matches!(
            token.check(),
            Err(EngineError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_deadline_in_past_trips() {
        let token = CancellationToken::new(Some(Duration::from_nanos(1)));
        std::thread::sleep(Duration::from_millis(2));
        assert!(token.check().is_err());
    }
}
