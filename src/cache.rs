//! Rendered-response cache with path and tag revalidation.
//!
//! Query endpoints store their JSON under the request path together with the
//! tags describing what the data depends on. Mutations revalidate the paths
//! and tags they touch; the next read misses and goes back to the database.
//!
//! Entries also expire after a fixed age, and the cache holds at most a fixed
//! number of them; inserting into a full cache evicts the oldest entry.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    tags: HashSet<String>,
    stored_at: DateTime<Utc>,
}

/// Default entry bound
pub const DEFAULT_MAX_ENTRIES: usize = 1_000;
/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

impl CacheEntry {
    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        (now - self.stored_at).to_std().unwrap_or_default() >= ttl
    }
}

/// Path/tag keyed response cache
#[derive(Debug)]
pub struct RevalidationCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    generation: AtomicU64,
    max_entries: usize,
    ttl: Duration,
}

impl Default for RevalidationCache {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

/// Key of a cached read: the path plus an optional query string.
#[must_use]
pub fn cache_key(path: &str, query: Option<&str>) -> String {
    match query.filter(|q| !q.is_empty()) {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

fn key_matches_path(key: &str, path: &str) -> bool {
    key == path || key.strip_prefix(path).is_some_and(|rest| rest.starts_with('?'))
}

impl RevalidationCache {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty cache holding at most `max_entries`, each for at most `ttl`
    #[must_use]
    pub fn with_limits(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Cached value for `key`, unless it has expired
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(self.ttl, Utc::now()))
            .map(|entry| entry.value.clone())
    }

    /// When `key` was stored
    pub fn stored_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).map(|entry| entry.stored_at)
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn insert<I, S>(&self, key: &str, tags: I, value: Value)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        let entry = CacheEntry {
            value,
            tags: tags.into_iter().map(Into::into).collect(),
            stored_at: now,
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            entries.retain(|_, e| !e.is_expired(self.ttl, now));
            while entries.len() >= self.max_entries {
                let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.stored_at)
                    .map(|(k, _)| k.clone())
                else {
                    break;
                };
                entries.remove(&oldest);
                debug!(key = %oldest, "Evicted cache entry");
            }
        }
        entries.insert(key.to_string(), entry);
    }

    /// Drop every entry stored under `path`, with or without a query string.
    /// Returns how many entries were removed.
    pub fn revalidate_path(&self, path: &str) -> usize {
        let removed = self.remove_where(|key, _| key_matches_path(key, path));
        debug!(path, removed, "Revalidated path");
        removed
    }

    /// Drop every entry carrying `tag`.
    pub fn revalidate_tag(&self, tag: &str) -> usize {
        let removed = self.remove_where(|_, entry| entry.tags.contains(tag));
        debug!(tag, removed, "Revalidated tag");
        removed
    }

    fn remove_where(&self, predicate: impl Fn(&str, &CacheEntry) -> bool) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, entry| !predicate(key, entry));
        self.generation.fetch_add(1, Ordering::SeqCst);
        before - entries.len()
    }

    /// Number of revalidations so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_matches_query_variants_only() {
        let cache = RevalidationCache::new();
        cache.insert("/booking", ["a"], json!(1));
        cache.insert("/booking?page=2", ["a"], json!(2));
        cache.insert("/booking/123", ["b"], json!(3));

        assert_eq!(cache.revalidate_path("/booking"), 2);
        assert!(cache.get("/booking/123").is_some());
    }

    #[test]
    fn test_tag_revalidation_is_idempotent() {
        let cache = RevalidationCache::new();
        cache.insert("/dashboard/staff", ["salon-1-staff"], json!([]));
        cache.insert("/dashboard/loyalty", ["loyalty-1"], json!({}));

        assert_eq!(cache.revalidate_tag("salon-1-staff"), 1);
        assert_eq!(cache.revalidate_tag("salon-1-staff"), 0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.generation(), 2);
    }

    #[test]
    fn test_full_cache_evicts_oldest() {
        let cache = RevalidationCache::with_limits(2, DEFAULT_TTL);
        cache.insert("/bookings?search=a", ["salon-1"], json!(1));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("/bookings?search=b", ["salon-1"], json!(2));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("/bookings?search=b", ["salon-1"], json!(3));
        assert_eq!(cache.len(), 2);

        cache.insert("/bookings?search=c", ["salon-1"], json!(4));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("/bookings?search=a").is_none());
        assert_eq!(cache.get("/bookings?search=b"), Some(json!(3)));
        assert_eq!(cache.get("/bookings?search=c"), Some(json!(4)));
    }

    #[test]
    fn test_expired_entries_miss() {
        let cache = RevalidationCache::with_limits(10, Duration::from_millis(5));
        cache.insert("/capacity", ["salon-1"], json!(1));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("/capacity").is_none());

        let cache = RevalidationCache::with_limits(1, Duration::from_millis(5));
        cache.insert("/a", ["t"], json!(1));
        std::thread::sleep(Duration::from_millis(20));
        cache.insert("/b", ["t"], json!(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("/b"), Some(json!(2)));
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("/a", None), "/a");
        assert_eq!(cache_key("/a", Some("")), "/a");
        assert_eq!(cache_key("/a", Some("x=1")), "/a?x=1");
    }
}
