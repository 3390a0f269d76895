//! In-process LRU blob cache.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use bytes::Bytes;
use lru::LruCache;

use super::KeyValueStore;

pub struct MemoryCache {
    entries: Mutex<LruCache<String, Bytes>>,
}

impl MemoryCache {
    /// A cache holding at most `size` blobs.
    pub fn new(size: usize) -> Self {
        let capacity = NonZeroUsize::new(size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl KeyValueStore for MemoryCache {
    fn get(&self, key: &str) -> Option<Bytes> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn put(&self, key: &str, value: Bytes) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.put(key.to_string(), value);
    }

    fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_contains() {
        let cache = MemoryCache::new(4);
        cache.put("a/blob.jsonl", Bytes::from_static(b"rows"));
        assert!(cache.contains("a/blob.jsonl"));
        assert_eq!(cache.get("a/blob.jsonl"), Some(Bytes::from_static(b"rows")));
        assert!(!cache.contains("b/blob.jsonl"));
    }

    #[test]
    fn test_eviction_is_lru() {
        let cache = MemoryCache::new(2);
        cache.put("one", Bytes::from_static(b"1"));
        cache.put("two", Bytes::from_static(b"2"));
        // touch "one" so "two" is the eviction candidate
        let _ = cache.get("one");
        cache.put("three", Bytes::from_static(b"3"));
        assert!(cache.contains("one"));
        assert!(!cache.contains("two"));
        assert!(cache.contains("three"));
    }
}
