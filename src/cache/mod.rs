mod redis_store;

pub use redis_store::RedisCache;

use crate::clock::Clock;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc, time::Duration};

#[async_trait]
pub trait CacheStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V>;

    /// `ttl = None` keeps the value until it is overwritten.
    async fn set(&self, key: &str, value: V, ttl: Option<Duration>);
}

struct Entry<V> {
    value: V,
    expires_at: Option<DateTime<Utc>>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

pub struct MemoryCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    clock: Arc<dyn Clock>,
}

impl<V> MemoryCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl<V> CacheStore<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        {
            let guard = self.entries.read();
            let entry = guard.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        let mut guard = self.entries.write();
        if guard.get(key).is_some_and(|entry| entry.is_expired(now)) {
            guard.remove(key);
        }
        None
    }

    /// Expired entries are swept on every write.
    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let now = self.clock.now();
        let expires_at = ttl
            .and_then(|ttl| TimeDelta::from_std(ttl).ok())
            .map(|ttl| now + ttl);
        let mut guard = self.entries.write();
        guard.retain(|_, entry| !entry.is_expired(now));
        guard.insert(key.to_string(), Entry { value, expires_at });
    }
}
