//! In-memory implementation of CacheGateway

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use super::gateway::{CacheError, CacheGateway};

/// Lifetime used when `now + ttl` is not representable
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

fn expiry(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Counters reported by [`InMemoryCacheGateway::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub deletes: u64,
}

/// Process-local TTL cache
///
/// Expired entries are dropped lazily on access and in bulk by
/// [`purge_expired`](Self::purge_expired). Pattern deletes use Redis `KEYS`
/// glob semantics (`*` and `?`).
///
/// # Example
///
/// ```ignore
/// use lol_analytics_engine::cache::{CacheGateway, InMemoryCacheGateway};
///
/// let cache = InMemoryCacheGateway::new();
/// cache.set_json("mmr:1:30", &json!({"current": 1450}), Duration::from_secs(60)).await?;
/// assert_eq!(cache.get_json("mmr:1:30").await?, Some(json!({"current": 1450})));
/// ```
pub struct InMemoryCacheGateway {
    entries: DashMap<String, CacheEntry>,
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryCacheGateway {
    /// Create an enabled, empty cache
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            enabled: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Create a cache that reports itself disabled
    pub fn disabled() -> Self {
        let cache = Self::new();
        cache.set_enabled(false);
        cache
    }

    /// Switch the cache on or off
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a live entry exists for `key`
    pub fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// Remaining lifetime of a live entry
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }

    /// Remove a single key
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.deletes.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove every entry
    pub fn flush_all(&self) {
        self.entries.clear();
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: self.is_enabled(),
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

impl Default for InMemoryCacheGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheGateway for InMemoryCacheGateway {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    async fn get_json(&self, key: &str) -> Result<Option<Value>, CacheError> {
        if !self.is_enabled() {
            return Err(CacheError::Disabled);
        }

        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone());

        match value {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            None => {
                self.entries.remove_if(key, |_, entry| entry.is_expired(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set_json(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        if !self.is_enabled() {
            return Ok(());
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                expires_at: expiry(Instant::now(), ttl),
            },
        );
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        if !self.is_enabled() {
            return Ok(0);
        }

        let before = self.entries.len();
        self.entries.retain(|key, _| !glob_match(pattern, key));
        let removed = before.saturating_sub(self.entries.len()) as u64;
        self.deletes.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }
}

/// Match `text` against a glob with `*` (any run) and `?` (one character)
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p).copied() {
            Some('*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                // Let the last star absorb one more character
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    star = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("analytics:42:*", "analytics:42:week:period_stats"));
        assert!(glob_match("analytics:42:*", "analytics:42:"));
        assert!(!glob_match("analytics:42:*", "analytics:421:week"));
        assert!(glob_match("recommendations:42", "recommendations:42"));
        assert!(!glob_match("recommendations:42", "recommendations:420"));
        assert!(glob_match("mmr:?:30", "mmr:7:30"));
        assert!(!glob_match("mmr:?:30", "mmr:77:30"));
        assert!(glob_match("*:week:*", "analytics:1:week:period_stats"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("", "x"));
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = InMemoryCacheGateway::new();
        cache
            .set_json("mmr:1:30", &json!({"current": 1450}), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(
            cache.get_json("mmr:1:30").await.unwrap(),
            Some(json!({"current": 1450}))
        );
        assert_eq!(cache.get_json("mmr:1:90").await.unwrap(), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_does_not_expire() {
        let cache = InMemoryCacheGateway::new();
        cache
            .set_json("mmr:1:30", &json!(1), Duration::from_secs(u64::MAX))
            .await
            .unwrap();

        assert_eq!(cache.get_json("mmr:1:30").await.unwrap(), Some(json!(1)));
        assert!(cache.ttl("mmr:1:30").unwrap() > Duration::from_secs(365 * 24 * 60 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = InMemoryCacheGateway::new();
        cache
            .set_json("k", &json!(1), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(cache.exists("k"));
        assert_eq!(cache.ttl("k"), Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(!cache.exists("k"));
        assert_eq!(cache.get_json("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = InMemoryCacheGateway::new();
        cache.set_json("short", &json!(1), Duration::from_secs(1)).await.unwrap();
        cache.set_json("long", &json!(2), Duration::from_secs(100)).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.exists("long"));
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = InMemoryCacheGateway::new();
        let ttl = Duration::from_secs(60);
        for key in ["champion:1:157:week", "champion:1:22:month", "champion:2:157:week"] {
            cache.set_json(key, &json!(true), ttl).await.unwrap();
        }

        assert_eq!(cache.delete_pattern("champion:1:*").await.unwrap(), 2);
        assert!(cache.exists("champion:2:157:week"));
        assert_eq!(cache.stats().deletes, 2);
    }

    #[tokio::test]
    async fn test_disabled_cache() {
        let cache = InMemoryCacheGateway::disabled();
        assert!(!cache.is_enabled());
        assert_eq!(cache.get_json("k").await, Err(CacheError::Disabled));

        cache.set_json("k", &json!(1), Duration::from_secs(1)).await.unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.delete_pattern("*").await.unwrap(), 0);

        cache.set_enabled(true);
        assert!(cache.is_enabled());
    }

    #[tokio::test]
    async fn test_delete_and_flush() {
        let cache = InMemoryCacheGateway::new();
        let ttl = Duration::from_secs(60);
        cache.set_json("a", &json!(1), ttl).await.unwrap();
        cache.set_json("b", &json!(2), ttl).await.unwrap();

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        cache.flush_all();
        assert!(cache.is_empty());
    }
}
