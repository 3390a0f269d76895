//! The process-wide relation catalogue.
//!
//! Maps a relation name to its [`RelationSchema`] plus optional statistics.
//! Sample relations are registered once at init; dataset-backed relations
//! are populated lazily the first time the binder resolves them. Entries are
//! immutable for the life of a query.

use std::collections::HashMap;
use std::sync::RwLock;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

pub mod schema;

pub use schema::{new_identity, RelationSchema, SchemaColumn};

/// Optional per-relation statistics, advisory only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationStatistics {
    pub row_count_estimate: Option<u64>,
    pub blob_count: Option<u64>,
}

#[derive(Debug, Clone)]
struct CatalogueEntry {
    schema: RelationSchema,
    statistics: Option<RelationStatistics>,
    source: String,
}

#[derive(Default)]
pub struct Catalogue {
    entries: RwLock<HashMap<String, CatalogueEntry>>,
}

lazy_static! {
    static ref CATALOGUE: Catalogue = {
        let catalogue = Catalogue::default();
        for (name, schema) in crate::samples::sample_schemas() {
            catalogue.register(name, schema, None, "sample");
        }
        catalogue
    };
}

impl Catalogue {
    pub fn global() -> &'static Catalogue {
        &CATALOGUE
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        schema: RelationSchema,
        statistics: Option<RelationStatistics>,
        source: impl Into<String>,
    ) {
        let name = name.into();
        log::debug!("catalogue: registering relation '{name}'");
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            name,
            CatalogueEntry {
                schema,
                statistics,
                source: source.into(),
            },
        );
    }

    pub fn schema(&self, name: &str) -> Option<RelationSchema> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(name).map(|entry| entry.schema.clone())
    }

    pub fn statistics(&self, name: &str) -> Option<RelationStatistics> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(name).and_then(|entry| entry.statistics.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(name)
    }

    /// Distinct sources that have registered relations (SHOW DATABASES).
    pub fn sources(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut sources: Vec<String> = entries.values().map(|e| e.source.clone()).collect();
        sources.sort();
        sources.dedup();
        sources
    }

    /// Relation names known right now, sorted.
    pub fn relation_names(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morsel::DataType;

    #[test]
    fn test_samples_registered_at_init() {
        let catalogue = Catalogue::global();
        assert!(catalogue.contains("$planets"));
        assert!(catalogue.contains("$no_table"));
    }

    #[test]
    fn test_register_and_lookup() {
        let catalogue = Catalogue::default();
        let schema = RelationSchema::new(
            "trades",
            vec![SchemaColumn::new("price", DataType::Double)],
        );
        catalogue.register("trades", schema, None, "disk");
        assert!(catalogue.contains("trades"));
        assert_eq!(catalogue.sources(), vec!["disk".to_string()]);
        assert!(catalogue.schema("unknown").is_none());
    }
}
