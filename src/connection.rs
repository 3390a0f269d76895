//! The client façade: connections and cursors.
//!
//! A [`Connection`] carries the cache handle, the permission set and
//! session context; a [`Cursor`] runs exactly one `execute` and exposes
//! the aggregated columnar result, per-query statistics and run-time
//! messages. There are no transactions and no multi-statement sessions; a
//! cursor is single-shot.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, Utc};
use uuid::Uuid;

use crate::cache::KeyValueStore;
use crate::config::EngineConfig;
use crate::context::{CancellationToken, QueryContext, QueryStatistics};
use crate::errors::{EngineError, Result};
use crate::morsel::{Datum, Morsel};
use crate::permissions::{all_permissions, Permission};
use crate::pipeline::{self, PipelineOptions};

pub type HistoryItem = (String, bool, NaiveDateTime);

pub struct ConnectionContext {
    pub connection_id: String,
    pub connected_at: NaiveDateTime,
    pub user: Option<String>,
    /// Default schema used to qualify bare relation names
    pub schema: Option<String>,
    pub variables: HashMap<String, Datum>,
    history: Mutex<Vec<HistoryItem>>,
}

impl ConnectionContext {
    fn new(user: Option<String>, schema: Option<String>) -> Self {
        let connection_id = Uuid::new_v4().to_string();
        let mut variables = HashMap::new();
        variables.insert(
            "version".to_string(),
            Datum::Varchar(env!("CARGO_PKG_VERSION").to_string()),
        );
        variables.insert(
            "connection_id".to_string(),
            Datum::Varchar(connection_id.clone()),
        );
        variables.insert(
            "default_schema".to_string(),
            schema
                .clone()
                .map(Datum::Varchar)
                .unwrap_or(Datum::Null),
        );
        Self {
            connection_id,
            connected_at: Utc::now().naive_utc(),
            user,
            schema,
            variables,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn history(&self) -> Vec<HistoryItem> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.clone()
    }

    fn record(&self, statement: &str, success: bool) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push((statement.to_string(), success, Utc::now().naive_utc()));
    }
}

pub struct Connection {
    pub cache: Option<Arc<dyn KeyValueStore>>,
    pub permissions: HashSet<Permission>,
    pub context: ConnectionContext,
    pub config: EngineConfig,
}

impl Connection {
    /// A connection with an optional blob cache and a permission subset;
    /// `None` grants the full vocabulary, an empty set is rejected.
    pub fn new(
        cache: Option<Arc<dyn KeyValueStore>>,
        permissions: Option<&[Permission]>,
    ) -> Result<Self> {
        let permissions: HashSet<Permission> = match permissions {
            None => all_permissions(),
            Some(permissions) => permissions.iter().copied().collect(),
        };
        if permissions.is_empty() {
            return Err(EngineError::Permissions(
                "no valid permissions presented".to_string(),
            ));
        }
        Ok(Self {
            cache,
            permissions,
            context: ConnectionContext::new(None, None),
            config: EngineConfig::default(),
        })
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        let schema = schema.into();
        self.context.variables.insert(
            "default_schema".to_string(),
            Datum::Varchar(schema.clone()),
        );
        self.context.schema = Some(schema);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }
}

/// Open a connection with defaults: no cache, full permissions.
pub fn connect() -> Result<Connection> {
    Connection::new(None, None)
}

pub struct Cursor<'a> {
    connection: &'a Connection,
    qid: String,
    statistics: Arc<QueryStatistics>,
    token: CancellationToken,
    deadline: Option<Duration>,
    executed: bool,
    result: Option<Morsel>,
}

impl<'a> Cursor<'a> {
    fn new(connection: &'a Connection) -> Self {
        Self {
            connection,
            qid: Uuid::new_v4().to_string(),
            statistics: Arc::new(QueryStatistics::default()),
            token: CancellationToken::new(None),
            deadline: None,
            executed: false,
            result: None,
        }
    }

    /// The unique internal reference for this query.
    pub fn id(&self) -> &str {
        &self.qid
    }

    /// Optional query deadline; past it the token trips to Cancelled.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// A handle that cancels the running query between batches.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run a statement. Single-shot: a second call is `CursorInvalidState`.
    /// Multiple `;`-separated statements run in order and the final result
    /// set is kept.
    pub fn execute(&mut self, operation: &str, parameters: &[Datum]) -> Result<()> {
        if self.executed {
            return Err(EngineError::CursorInvalidState);
        }
        self.executed = true;

        if operation.trim().is_empty() {
            return Err(EngineError::MissingSqlStatement);
        }

        let outcome = self.run(operation, parameters);
        self.connection
            .context
            .record(operation, outcome.is_ok());
        outcome
    }

    fn run(&mut self, operation: &str, parameters: &[Datum]) -> Result<()> {
        let planning_started = Instant::now();
        let options = PipelineOptions {
            permissions: &self.connection.permissions,
            default_schema: self.connection.context.schema.as_deref(),
            cache: self.connection.cache.clone(),
            config: &self.connection.config,
        };
        let plans = pipeline::plan_statements(operation, parameters, &options)?;
        self.statistics
            .record_elapsed(&self.statistics.time_planning_ns, planning_started);

        self.token = CancellationToken::new(self.deadline);
        for plan in plans {
            let ctx = Arc::new(QueryContext {
                qid: self.qid.clone(),
                statistics: self.statistics.clone(),
                token: self.token.clone(),
                cache: self.connection.cache.clone(),
                config: self.connection.config.clone(),
                permissions: self.connection.permissions.clone(),
                variables: self.connection.context.variables.clone(),
            });
            let mut batches = Vec::new();
            let output_schema = plan.output_schema().clone();
            for batch in plan.execute(ctx)? {
                batches.push(batch?);
            }
            if batches.is_empty() {
                // an empty result still carries its column shape
                let columns = output_schema
                    .columns
                    .iter()
                    .map(|column| {
                        crate::morsel::Column::new(
                            column.query_column.clone(),
                            crate::morsel::Array::Null(0),
                        )
                    })
                    .collect();
                self.result = Some(Morsel::new(columns)?);
            } else {
                self.result = Some(Morsel::concat(&batches)?);
            }
        }
        Ok(())
    }

    /// The aggregated columnar result of the (final) statement.
    pub fn fetch_all(&self) -> Result<Morsel> {
        self.result
            .clone()
            .ok_or(EngineError::CursorInvalidState)
    }

    /// Execution statistics.
    pub fn stats(&self) -> std::collections::BTreeMap<String, u64> {
        self.statistics.as_map()
    }

    /// Run-time warnings.
    pub fn messages(&self) -> Vec<String> {
        self.statistics.messages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_is_single_shot() {
        let connection = connect().unwrap();
        let mut cursor = connection.cursor();
        cursor.execute("SELECT 1", &[]).unwrap();
        assert_eq!(
            cursor.execute("SELECT 1", &[]),
            Err(EngineError::CursorInvalidState)
        );
    }

    #[test]
    fn test_empty_statement() {
        let connection = connect().unwrap();
        let mut cursor = connection.cursor();
        assert_eq!(
            cursor.execute("   ", &[]),
            Err(EngineError::MissingSqlStatement)
        );
    }

    #[test]
    fn test_empty_permission_set_rejected() {
        assert!(matches!(
            Connection::new(None, Some(&[])),
            Err(EngineError::Permissions(_))
        ));
    }

    #[test]
    fn test_history_records_statements() {
        let connection = connect().unwrap();
        let mut cursor = connection.cursor();
        cursor.execute("SELECT 1", &[]).unwrap();
        let history = connection.context.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].1);
    }

    #[test]
    fn test_fetch_before_execute() {
        let connection = connect().unwrap();
        let cursor = connection.cursor();
        assert_eq!(cursor.fetch_all(), Err(EngineError::CursorInvalidState));
    }
}
