//! Connectors: how the engine reads datasets from storage.
//!
//! A connector advertises its mode (blob store or document collection) and
//! capability set, yields decoded columnar batches for a temporal range,
//! and can describe a dataset's schema. The scanner operator is the only
//! consumer.

use std::sync::Arc;

use crate::cache::KeyValueStore;
use crate::catalogue::RelationSchema;
use crate::context::QueryStatistics;
use crate::errors::Result;
use crate::morsel::Morsel;
use crate::sql_rewriter::TemporalRange;

pub mod decoders;
pub mod disk;

pub use disk::DiskConnector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorMode {
    Blob,
    Collection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Cacheable,
    Partitionable,
    Asynchronous,
}

pub trait Connector {
    fn mode(&self) -> ConnectorMode;
    fn capabilities(&self) -> &'static [Capability];

    /// Decoded batches for the connector's dataset and range.
    fn read_dataset(&self) -> Result<Box<dyn Iterator<Item = Result<Morsel>>>>;

    /// The dataset's schema, inferred or fetched.
    fn dataset_schema(&self) -> Result<RelationSchema>;
}

/// Resolve a dataset's schema for the binder.
pub fn dataset_schema(
    relation: &str,
    cache: Option<Arc<dyn KeyValueStore>>,
) -> Result<RelationSchema> {
    let connector = DiskConnector::new(
        relation,
        TemporalRange::today(),
        cache,
        Arc::new(QueryStatistics::default()),
    );
    connector.dataset_schema()
}
