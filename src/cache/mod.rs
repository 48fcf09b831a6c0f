//! Cache layer
//!
//! Process-local caching for backend data and per-visitor state. Values are
//! stored as JSON so any serializable type fits, and every entry carries its
//! own TTL.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mysite_web::cache::{create_cache, CacheLayer};
//!
//! let cache = create_cache(10_000, Duration::from_secs(300));
//! cache.set("posts:index", &posts, Duration::from_secs(60)).await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Cache layer trait
///
/// The methods are generic, so this trait is not object safe. Use the
/// `Cache` enum where a single runtime type is needed.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values matching a glob pattern (`*` and `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Clear all cache entries
    async fn clear(&self) -> Result<()>;
}

pub use memory::MemoryCache;

/// Unified cache type shared through application state
#[derive(Debug)]
pub enum Cache {
    /// In-memory cache using moka
    Memory(MemoryCache),
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete(key).await,
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete_pattern(pattern).await,
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.clear().await,
        }
    }
}

impl Cache {
    /// TTL used by callers that have no specific lifetime in mind
    pub fn default_ttl(&self) -> Duration {
        match self {
            Cache::Memory(cache) => cache.default_ttl(),
        }
    }
}

/// Create a shared in-memory cache
pub fn create_cache(max_capacity: u64, default_ttl: Duration) -> Arc<Cache> {
    Arc::new(Cache::Memory(MemoryCache::with_capacity_and_ttl(
        max_capacity,
        default_ttl,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_cache() {
        let cache = create_cache(100, Duration::from_secs(60));

        cache.set("test_key", &"test_value".to_string(), Duration::from_secs(60)).await.unwrap();
        let result: Option<String> = cache.get("test_key").await.unwrap();
        assert_eq!(result, Some("test_value".to_string()));
        assert_eq!(cache.default_ttl(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_cache_enum_delete_pattern() {
        let cache = create_cache(100, Duration::from_secs(60));
        cache.set("posts:slug:a", &1u32, Duration::from_secs(60)).await.unwrap();
        cache.set("posts:slug:b", &2u32, Duration::from_secs(60)).await.unwrap();
        cache.set("session:x", &3u32, Duration::from_secs(60)).await.unwrap();

        cache.delete_pattern("posts:*").await.unwrap();

        assert_eq!(cache.get::<u32>("posts:slug:a").await.unwrap(), None);
        assert_eq!(cache.get::<u32>("posts:slug:b").await.unwrap(), None);
        assert_eq!(cache.get::<u32>("session:x").await.unwrap(), Some(3));
    }
}
