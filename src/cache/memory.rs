//! In-memory cache implementation using moka
//!
//! Entries are stored as JSON strings and expire individually: the TTL passed
//! to `set` is honoured through a moka `Expiry` policy, capped by the cache's
//! default TTL.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_CAPACITY: u64 = 10_000;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct CacheEntry {
    data: Arc<String>,
    ttl: Duration,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T, ttl: Duration) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
            ttl,
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

/// Per-entry expiry: each write restarts the entry's own TTL.
struct EntryExpiry {
    max_ttl: Duration,
}

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl.min(self.max_ttl))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl.min(self.max_ttl))
    }
}

/// In-memory cache using moka
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    /// Create a cache holding up to 10,000 entries for at most one hour each
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    /// Create a cache with a custom capacity and default (maximum) TTL
    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry { max_ttl: default_ttl })
            .build();

        Self { cache, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Glob match supporting `*` (any run) and `?` (one character).
    ///
    /// `posts:*` matches `posts:index` and `posts:slug:hello`,
    /// `thread:?:*` matches `thread:7:abc` but not `thread:17:abc`.
    fn pattern_matches(pattern: &str, key: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().collect();
        let key: Vec<char> = key.chars().collect();

        let (mut p, mut k) = (0usize, 0usize);
        // Position of the last `*` seen and the key index it was tried against
        let mut backtrack: Option<(usize, usize)> = None;

        while k < key.len() {
            match pattern.get(p) {
                Some('*') => {
                    backtrack = Some((p, k));
                    p += 1;
                }
                Some('?') => {
                    p += 1;
                    k += 1;
                }
                Some(c) if *c == key[k] => {
                    p += 1;
                    k += 1;
                }
                _ => match backtrack {
                    Some((star, matched)) => {
                        p = star + 1;
                        k = matched + 1;
                        backtrack = Some((star, matched + 1));
                    }
                    None => return false,
                },
            }
        }

        pattern[p..].iter().all(|c| *c == '*')
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, ttl)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        // Full scan; fine for the key counts this cache holds
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| Self::pattern_matches(pattern, key.as_ref()))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys {
            self.cache.invalidate(&key).await;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_entry_lifecycle() {
        let cache = MemoryCache::new();
        let key = "session:ab12";

        assert_eq!(cache.get::<Vec<String>>(key).await.unwrap(), None);

        cache.set(key, &vec!["Comment posted".to_string()], Duration::from_secs(60)).await.unwrap();
        cache.set(key, &vec!["Signed out".to_string()], Duration::from_secs(60)).await.unwrap();
        let toasts: Option<Vec<String>> = cache.get(key).await.unwrap();
        assert_eq!(toasts, Some(vec!["Signed out".to_string()]));

        cache.delete(key).await.unwrap();
        assert_eq!(cache.get::<Vec<String>>(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_per_entry_ttl_is_honoured() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(60));

        cache.set("short", &1u8, Duration::from_millis(10)).await.unwrap();
        cache.set("long", &2u8, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.cache.run_pending_tasks().await;

        assert_eq!(cache.get::<u8>("short").await.unwrap(), None);
        assert_eq!(cache.get::<u8>("long").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_ttl_capped_by_default() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_millis(10));

        cache.set("key", &"v".to_string(), Duration::from_secs(3600)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.cache.run_pending_tasks().await;

        assert_eq!(cache.get::<String>("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = MemoryCache::new();

        cache.set("key1", &"value1".to_string(), Duration::from_secs(60)).await.unwrap();
        cache.delete("key1").await.unwrap();

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_delete_pattern_question_mark() {
        let cache = MemoryCache::new();

        cache.set("thread:1:a", &1u32, Duration::from_secs(60)).await.unwrap();
        cache.set("thread:2:a", &2u32, Duration::from_secs(60)).await.unwrap();
        cache.set("thread:10:a", &10u32, Duration::from_secs(60)).await.unwrap();

        cache.delete_pattern("thread:?:a").await.unwrap();

        assert_eq!(cache.get::<u32>("thread:1:a").await.unwrap(), None);
        assert_eq!(cache.get::<u32>("thread:2:a").await.unwrap(), None);
        assert_eq!(cache.get::<u32>("thread:10:a").await.unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_clear_drops_posts_and_sessions() {
        let cache = MemoryCache::new();

        cache.set("posts:index", &vec!["hello-world"], Duration::from_secs(60)).await.unwrap();
        cache.set("session:cd34", &true, Duration::from_secs(60)).await.unwrap();
        cache.clear().await.unwrap();
        cache.cache.run_pending_tasks().await;

        assert_eq!(cache.get::<Vec<String>>("posts:index").await.unwrap(), None);
        assert_eq!(cache.get::<bool>("session:cd34").await.unwrap(), None);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_pattern_matches() {
        assert!(MemoryCache::pattern_matches("posts:*", "posts:index"));
        assert!(MemoryCache::pattern_matches("posts:*", "posts:"));
        assert!(MemoryCache::pattern_matches("*:html:*", "posts:html:hello:dark"));
        assert!(MemoryCache::pattern_matches("*", ""));
        assert!(!MemoryCache::pattern_matches("posts:*", "session:1"));

        assert!(MemoryCache::pattern_matches("thread:?:x", "thread:1:x"));
        assert!(!MemoryCache::pattern_matches("thread:?:x", "thread:10:x"));
        assert!(!MemoryCache::pattern_matches("?", ""));

        assert!(MemoryCache::pattern_matches("exact", "exact"));
        assert!(!MemoryCache::pattern_matches("exact", "exactx"));
        assert!(!MemoryCache::pattern_matches("exactx", "exact"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(20))]

            /// A `prefix*` pattern matches exactly the keys starting with the prefix.
            #[test]
            fn prefix_star_matches_prefix(prefix in "[a-z:]{0,8}", rest in "[a-z0-9:]{0,12}", other in "[a-z0-9:]{0,12}") {
                let pattern = format!("{}*", prefix);
                let key = format!("{}{}", prefix, rest);
                prop_assert!(MemoryCache::pattern_matches(&pattern, &key));
                prop_assert_eq!(
                    MemoryCache::pattern_matches(&pattern, &other),
                    other.starts_with(&prefix)
                );
            }

            /// A pattern without wildcards only matches itself.
            #[test]
            fn literal_pattern_is_equality(a in "[a-z:]{0,10}", b in "[a-z:]{0,10}") {
                prop_assert_eq!(MemoryCache::pattern_matches(&a, &b), a == b);
            }

            /// Cached values survive the JSON round trip unchanged.
            #[test]
            fn cached_values_roundtrip(key in "[a-z]{1,10}", value in proptest::collection::vec(any::<i64>(), 0..20)) {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async {
                    let cache = MemoryCache::new();
                    cache.set(&key, &value, Duration::from_secs(60)).await.unwrap();
                    let result: Option<Vec<i64>> = cache.get(&key).await.unwrap();
                    prop_assert_eq!(result, Some(value.clone()));
                    Ok(())
                })?;
            }
        }
    }
}
