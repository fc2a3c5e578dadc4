//! Cache collaborator
//!
//! A key/value store with TTL and tag-based invalidation, consumed by the
//! dead-server status tracker, the query-result cache, and the schema
//! metadata cache. Hosts with a distributed cache implement `Cache`
//! themselves; `MemoryCache` is the in-process default.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Key/value cache interface.
pub trait Cache: Send + Sync {
    /// Get a value, honoring expiry.
    fn get(&self, key: &str) -> Option<JsonValue>;

    /// Store a value with an optional time-to-live.
    fn set(&self, key: &str, value: JsonValue, ttl: Option<Duration>);

    /// Store a value under an invalidation tag.
    fn set_with_tag(&self, key: &str, value: JsonValue, ttl: Option<Duration>, tag: &str);

    /// Drop every entry stored under the given tag.
    fn invalidate_tag(&self, tag: &str);

    /// Drop a single entry.
    fn remove(&self, key: &str);

    /// Build a normalized cache key from its parts.
    fn build_key(&self, parts: &[&str]) -> String {
        parts.join("\u{1f}")
    }
}

struct Entry {
    value: JsonValue,
    expires_at: Option<Instant>,
    tag: Option<String>,
}

/// In-process cache backed by a concurrent map.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| e.value().expires_at.map_or(true, |at| at > now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, key: &str, value: JsonValue, ttl: Option<Duration>, tag: Option<String>) {
        let expires_at = ttl.map(|d| Instant::now() + d);
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                tag,
            },
        );
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<JsonValue> {
        let entry = self.entries.get(key)?;
        if let Some(at) = entry.expires_at {
            if at <= Instant::now() {
                drop(entry);
                self.entries.remove(key);
                return None;
            }
        }
        Some(entry.value.clone())
    }

    fn set(&self, key: &str, value: JsonValue, ttl: Option<Duration>) {
        self.insert(key, value, ttl, None);
    }

    fn set_with_tag(&self, key: &str, value: JsonValue, ttl: Option<Duration>, tag: &str) {
        self.insert(key, value, ttl, Some(tag.to_string()));
    }

    fn invalidate_tag(&self, tag: &str) {
        self.entries
            .retain(|_, entry| entry.tag.as_deref() != Some(tag));
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Process-wide cache shared by connections that are not handed one
/// explicitly. Backs the dead-server status tracker, which must be shared
/// across all connections in the process to be useful.
pub(crate) static PROCESS_CACHE: Lazy<Arc<MemoryCache>> = Lazy::new(|| Arc::new(MemoryCache::new()));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get() {
        let cache = MemoryCache::new();
        cache.set("k", serde_json::json!(1), None);
        assert_eq!(cache.get("k"), Some(serde_json::json!(1)));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = MemoryCache::new();
        cache.set("k", serde_json::json!("v"), Some(Duration::from_millis(5)));
        assert!(cache.get("k").is_some());
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_tag_invalidation() {
        let cache = MemoryCache::new();
        cache.set_with_tag("a", serde_json::json!(1), None, "users");
        cache.set_with_tag("b", serde_json::json!(2), None, "orders");
        cache.invalidate_tag("users");
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_build_key_distinguishes_parts() {
        let cache = MemoryCache::new();
        assert_ne!(
            cache.build_key(&["ab", "c"]),
            cache.build_key(&["a", "bc"])
        );
    }
}
