use super::CacheStore;
use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Serialize, de::DeserializeOwned};
use std::{marker::PhantomData, time::Duration};
use tracing::debug;

/// Cache backed by Redis, values stored as JSON under `{prefix}:{key}`.
///
/// Connection or decode failures degrade to a miss; the caches it backs are
/// advisory.
pub struct RedisCache<V> {
    client: redis::Client,
    prefix: String,
    _marker: PhantomData<fn() -> V>,
}

impl<V> RedisCache<V> {
    pub fn new(client: redis::Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
            _marker: PhantomData,
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

#[async_trait]
impl<V> CacheStore<V> for RedisCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(err) => {
                debug!(target = "crosslist.cache", error = %err, "redis_connect_failed");
                return None;
            }
        };
        let s: Option<String> = conn.get(self.key(key)).await.ok();
        s.and_then(|v| serde_json::from_str(&v).ok())
    }

    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        if let Ok(mut conn) = self.client.get_multiplexed_async_connection().await
            && let Ok(json) = serde_json::to_string(&value)
        {
            let full_key = self.key(key);
            let _: Result<(), _> = match ttl {
                Some(ttl) => conn.set_ex(full_key, json, ttl.as_secs().max(1)).await,
                None => conn.set(full_key, json).await,
            };
        }
    }
}
