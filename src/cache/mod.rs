//! The blob cache contract.
//!
//! Key = blob path, value = raw bytes. The connector invokes the cache as a
//! read-through hook; eviction policy is the cache's concern, and an
//! implementation must carry its own interior locking because it is shared
//! across queries.

use bytes::Bytes;

pub mod memory;

pub use memory::MemoryCache;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Bytes>;
    fn put(&self, key: &str, value: Bytes);
    fn contains(&self, key: &str) -> bool;
}
