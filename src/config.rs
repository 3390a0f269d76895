use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Engine tunables with validation.
///
/// Every value can be overridden through a `BASALT_*` environment variable;
/// defaults suit an embedded, single-process deployment.
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Target row count for coalesced morsels (MorselDefragment)
    #[validate(range(
        min = 64,
        max = 10_000_000,
        message = "Morsel target rows must be between 64 and 10000000"
    ))]
    pub morsel_target_rows: usize,

    /// Batches smaller than this fraction of the target are considered
    /// fragmented and are coalesced
    #[validate(range(
        min = 1,
        max = 100,
        message = "Defragment threshold must be between 1 and 100 percent"
    ))]
    pub defragment_threshold_pct: usize,

    /// Memory ceiling in bytes for greedy operators (sort, aggregate, the
    /// build side of joins); exceeding it raises OutOfMemory
    #[validate(range(
        min = 1_048_576,
        message = "Greedy memory ceiling must be at least 1MiB"
    ))]
    pub max_materialized_bytes: u64,

    /// A Sort feeding a Limit is fused into a HeapSort when
    /// limit + offset does not exceed this
    #[validate(range(
        min = 1,
        max = 1_000_000,
        message = "Heap sort threshold must be between 1 and 1000000"
    ))]
    pub heap_sort_threshold: usize,

    /// Entry count for the default in-memory blob cache
    #[validate(range(min = 1, message = "Cache entries must be at least 1"))]
    pub cache_max_entries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            morsel_target_rows: 10_000,
            defragment_threshold_pct: 50,
            max_materialized_bytes: 256 * 1024 * 1024,
            heap_sort_threshold: 1_000,
            cache_max_entries: 64,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            morsel_target_rows: parse_env_var("BASALT_MORSEL_TARGET_ROWS", "10000")?,
            defragment_threshold_pct: parse_env_var("BASALT_DEFRAGMENT_THRESHOLD_PCT", "50")?,
            max_materialized_bytes: parse_env_var("BASALT_MAX_MATERIALIZED_BYTES", "268435456")?,
            heap_sort_threshold: parse_env_var("BASALT_HEAP_SORT_THRESHOLD", "1000")?,
            cache_max_entries: parse_env_var("BASALT_CACHE_MAX_ENTRIES", "64")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Minimum row count below which a morsel is treated as fragmented
    pub fn defragment_floor_rows(&self) -> usize {
        self.morsel_target_rows * self.defragment_threshold_pct / 100
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.morsel_target_rows, 10_000);
        assert_eq!(config.defragment_floor_rows(), 5_000);
    }

    #[test]
    fn test_invalid_morsel_target() {
        let config = EngineConfig {
            morsel_target_rows: 1, // below floor
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_memory_ceiling() {
        let config = EngineConfig {
            max_materialized_bytes: 1024, // below 1MiB
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
