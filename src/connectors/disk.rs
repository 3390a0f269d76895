//! Local filesystem connector.
//!
//! A dataset name maps onto a directory (`warehouse.logs` →
//! `warehouse/logs`). Blobs are read through the read-through cache hook
//! when one is attached, decoded by extension, and blobs with no
//! registered decoder are skipped. Datasets laid out with `year_YYYY`
//! directories are read through the Mabel partition scheme; anything else
//! is treated as flat.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::cache::KeyValueStore;
use crate::catalogue::{RelationSchema, SchemaColumn};
use crate::connectors::{decoders, Capability, Connector, ConnectorMode};
use crate::context::QueryStatistics;
use crate::errors::{EngineError, Result};
use crate::morsel::Morsel;
use crate::partitions::{FlatScheme, MabelScheme, PartitionScheme};
use crate::sql_rewriter::TemporalRange;

pub struct DiskConnector {
    dataset: String,
    range: TemporalRange,
    cache: Option<Arc<dyn KeyValueStore>>,
    statistics: Arc<QueryStatistics>,
}

impl DiskConnector {
    pub fn new(
        relation: &str,
        range: TemporalRange,
        cache: Option<Arc<dyn KeyValueStore>>,
        statistics: Arc<QueryStatistics>,
    ) -> Self {
        Self {
            dataset: relation.replace('.', "/"),
            range,
            cache,
            statistics,
        }
    }

    /// All decodable files below a prefix, relative paths, sorted.
    fn list_blob_names(prefix: &str) -> Vec<String> {
        fn walk(dir: &Path, found: &mut Vec<String>) {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(_) => return,
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, found);
                } else if let Some(path) = path.to_str() {
                    found.push(path.to_string());
                }
            }
        }
        let mut found = Vec::new();
        walk(Path::new(prefix), &mut found);
        found.sort();
        found
    }

    fn read_blob(&self, blob_name: &str) -> Result<Bytes> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(blob_name) {
                self.statistics.add(&self.statistics.cache_hits, 1);
                return Ok(cached);
            }
        }
        let raw = std::fs::read(blob_name)
            .map_err(|_| EngineError::DatasetNotFound(self.dataset.clone()))?;
        let bytes = Bytes::from(raw);
        if let Some(cache) = &self.cache {
            self.statistics.add(&self.statistics.cache_misses, 1);
            cache.put(blob_name, bytes.clone());
        }
        Ok(bytes)
    }

    fn blob_names(&self) -> Result<Vec<String>> {
        let lister = |prefix: &str| Self::list_blob_names(prefix);
        let partitioned = Self::list_blob_names(&self.dataset)
            .iter()
            .any(|blob| blob.contains("/year_"));
        if partitioned {
            MabelScheme.blobs_in_partition(
                self.range.start,
                self.range.end,
                &lister,
                &self.dataset,
            )
        } else {
            FlatScheme.blobs_in_partition(
                self.range.start,
                self.range.end,
                &lister,
                &self.dataset,
            )
        }
    }
}

impl Connector for DiskConnector {
    fn mode(&self) -> ConnectorMode {
        ConnectorMode::Blob
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Cacheable, Capability::Partitionable]
    }

    fn read_dataset(&self) -> Result<Box<dyn Iterator<Item = Result<Morsel>>>> {
        let blob_names = self.blob_names()?;
        let reader = DiskConnector {
            dataset: self.dataset.clone(),
            range: self.range,
            cache: self.cache.clone(),
            statistics: self.statistics.clone(),
        };
        let stream = blob_names.into_iter().filter_map(move |blob_name| {
            let decoder = match decoders::get_decoder(&blob_name) {
                Ok(decoder) => decoder,
                // not decodable (markers, sidecars): skip, don't fail the scan
                Err(EngineError::UnsupportedFileType(_)) => return None,
                Err(error) => return Some(Err(error)),
            };
            let bytes = match reader.read_blob(&blob_name) {
                Ok(bytes) => bytes,
                Err(error) => return Some(Err(error)),
            };
            reader.statistics.add(&reader.statistics.blobs_read, 1);
            Some(decoder(&bytes))
        });
        Ok(Box::new(stream))
    }

    fn dataset_schema(&self) -> Result<RelationSchema> {
        let mut batches = self.read_dataset()?;
        match batches.next() {
            Some(first) => {
                let first = first?;
                let columns = first
                    .columns()
                    .iter()
                    .map(|column| SchemaColumn::new(column.name.clone(), column.values.data_type()))
                    .collect();
                Ok(RelationSchema::new(self.dataset.clone(), columns))
            }
            None => {
                if Path::new(&self.dataset).is_dir() {
                    Err(EngineError::EmptyDataset(self.dataset.clone()))
                } else {
                    Err(EngineError::DatasetNotFound(self.dataset.clone()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_blob(dir: &Path, name: &str, content: &[u8]) {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(content).unwrap();
    }

    fn connector(dataset: &Path) -> DiskConnector {
        DiskConnector::new(
            dataset.to_str().unwrap(),
            TemporalRange::today(),
            None,
            Arc::new(QueryStatistics::default()),
        )
    }

    #[test]
    fn test_flat_dataset_read_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("logs");
        write_blob(&dataset, "part-0.jsonl", b"{\"id\": 1}\n{\"id\": 2}\n");
        write_blob(&dataset, "part-1.jsonl", b"{\"id\": 3}\n");
        write_blob(&dataset, "notes.txt", b"not data");

        let connector = connector(&dataset);
        let schema = connector.dataset_schema().unwrap();
        assert_eq!(schema.columns.len(), 1);

        let rows: usize = connector
            .read_dataset()
            .unwrap()
            .map(|batch| batch.unwrap().num_rows())
            .sum();
        assert_eq!(rows, 3);
    }

    #[test]
    fn test_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let connector = connector(&dir.path().join("nowhere"));
        assert!(matches!(
            connector.dataset_schema(),
            Err(EngineError::DatasetNotFound(_))
        ));
    }

    #[test]
    fn test_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("empty");
        std::fs::create_dir_all(&dataset).unwrap();
        let connector = connector(&dataset);
        assert!(matches!(
            connector.dataset_schema(),
            Err(EngineError::EmptyDataset(_))
        ));
    }

    #[test]
    fn test_cache_read_through() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("cached");
        write_blob(&dataset, "part-0.jsonl", b"{\"id\": 1}\n");

        let cache: Arc<dyn KeyValueStore> = Arc::new(crate::cache::MemoryCache::new(4));
        let statistics = Arc::new(QueryStatistics::default());
        let connector = DiskConnector::new(
            dataset.to_str().unwrap(),
            TemporalRange::today(),
            Some(cache.clone()),
            statistics.clone(),
        );

        connector.read_dataset().unwrap().count();
        assert_eq!(statistics.as_map()["cache_misses"], 1);
        assert_eq!(statistics.as_map()["cache_hits"], 0);

        connector.read_dataset().unwrap().count();
        assert_eq!(statistics.as_map()["cache_misses"], 1);
        assert_eq!(statistics.as_map()["cache_hits"], 1);
    }
}
