//! Cache backends for validated CAFs.
//!
//! The validator holds no state of its own; every CAF it authenticates lands in
//! a [`CacheService`] supplied by the host. Two backends ship with the crate:
//! an in-process [`MemoryCache`] and a shared [`RedisCache`].

use crate::caf::error::CacheError;
use async_trait::async_trait;
use log::debug;
use moka::future::Cache;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default number of entries kept by [`MemoryCache`].
pub const DEFAULT_CAPACITY: u64 = 10_000;

/// Key/value store with per-entry TTL.
///
/// Implementations must tolerate concurrent `get`/`set` from many tasks.
/// A missing key is reported as [`CacheError::Miss`].
#[async_trait]
pub trait CacheService<V>: Send + Sync
where
    V: Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<V, CacheError>;

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// A cached value together with the TTL it was stored with.
#[derive(Clone)]
struct CachedEntry<V> {
    value: V,
    ttl: Duration,
}

struct EntryExpiry;

impl<V> Expiry<String, CachedEntry<V>> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CachedEntry<V>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CachedEntry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process cache with per-entry TTL and bounded capacity.
pub struct MemoryCache<V> {
    cache: Cache<String, CachedEntry<V>>,
}

impl<V> MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();

        Self { cache }
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.cache.get(key).await.is_some()
    }
}

impl<V> Default for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl<V> CacheService<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<V, CacheError> {
        self.cache
            .get(key)
            .await
            .map(|entry| entry.value)
            .ok_or_else(|| CacheError::Miss {
                key: key.to_string(),
            })
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(key.to_string(), CachedEntry { value, ttl })
            .await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

/// Redis-backed cache storing values as JSON.
pub struct RedisCache<V> {
    redis_client: Arc<redis::Client>,
    _value: PhantomData<fn() -> V>,
}

impl<V> RedisCache<V> {
    pub fn new(redis_client: Arc<redis::Client>) -> Self {
        Self {
            redis_client,
            _value: PhantomData,
        }
    }

    pub fn open(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self::new(Arc::new(client)))
    }
}

#[async_trait]
impl<V> CacheService<V> for RedisCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<V, CacheError> {
        use redis::AsyncCommands;

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let json: Option<String> = conn.get(key).await?;

        match json {
            Some(json) => serde_json::from_str(&json).map_err(|e| CacheError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            }),
            None => Err(CacheError::Miss {
                key: key.to_string(),
            }),
        }
    }

    async fn set(&self, key: &str, value: V, ttl: Duration) -> Result<(), CacheError> {
        use redis::AsyncCommands;

        let json = serde_json::to_string(&value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        // EX 0 is rejected by Redis.
        let seconds = ttl.as_secs().max(1);

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, json, seconds).await?;

        debug!("Stored {} in Redis for {}s", key, seconds);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        use redis::AsyncCommands;

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}
