//! Optional Redis memoization of the current-user lookup.
//!
//! Gated by `ENABLE_CACHE`. Every Redis failure is logged and treated as a
//! miss, so a broken cache never fails a request.

use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

pub const USER_CACHE_TTL_SECS: u64 = 3600;

pub fn user_cache_key(auth_provider_id: &str) -> String {
    format!("user:{auth_provider_id}")
}

#[derive(Clone)]
pub struct UserCache {
    client: Option<redis::Client>,
    ttl_secs: u64,
}

impl UserCache {
    pub fn new(client: redis::Client) -> Self {
        Self {
            client: Some(client),
            ttl_secs: USER_CACHE_TTL_SECS,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            client: None,
            ttl_secs: USER_CACHE_TTL_SECS,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    async fn connection(&self) -> Option<redis::aio::MultiplexedConnection> {
        let client = self.client.as_ref()?;
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => Some(conn),
            Err(e) => {
                warn!("Redis connection error: {e}");
                None
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = match conn.get(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!("Redis GET {key} failed: {e}");
                return None;
            }
        };
        let value = serde_json::from_str(&raw?)
            .map_err(|e| warn!("Discarding unreadable cache entry {key}: {e}"))
            .ok()?;
        debug!("Cache hit for {key}");
        Some(value)
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize cache entry {key}: {e}");
                return;
            }
        };
        if let Err(e) = conn
            .set_ex::<_, _, ()>(key, payload, self.ttl_secs)
            .await
        {
            warn!("Redis SET {key} failed: {e}");
        }
    }

    pub async fn invalidate(&self, key: &str) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        if let Err(e) = conn.del::<_, ()>(key).await {
            warn!("Redis DEL {key} failed: {e}");
        }
    }
}
