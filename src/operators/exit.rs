//! The plan terminal.
//!
//! Verifies the final identity set is unique, renames identities to their
//! user-facing query names, and emits the batches the user sees. No
//! calculation happens here.

use std::collections::HashSet;
use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::{EngineError, Result};
use crate::morsel::Morsel;
use crate::operators::{one_producer, MorselStream, Operator};

pub struct ExitOperator {
    pub identities: Vec<String>,
    pub query_columns: Vec<String>,
}

impl Operator for ExitOperator {
    fn name(&self) -> &'static str {
        "Exit"
    }

    fn config(&self) -> String {
        self.query_columns.join(", ")
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        _ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        let producer = one_producer(producers, self.name())?;

        let mut seen = HashSet::new();
        let duplicates: Vec<&String> = self
            .identities
            .iter()
            .zip(&self.query_columns)
            .filter(|(identity, _)| !seen.insert(identity.as_str()))
            .map(|(_, name)| name)
            .collect();
        if !duplicates.is_empty() {
            return Err(EngineError::Sql(format!(
                "query result contains multiple instances of the same column: {}",
                duplicates
                    .into_iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        let operator = self.clone();
        let stream = producer.map(move |batch| -> Result<Morsel> {
            let batch = batch?;
            batch
                .select(&operator.identities)?
                .rename_columns(&operator.query_columns)
        });
        Ok(Box::new(stream))
    }
}
