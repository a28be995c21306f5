use anyhow::Result;
use futures::StreamExt;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(Self { client })
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    /// Reads a cached JSON value. Connection and decode failures read as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.client.get_multiplexed_async_connection().await.ok()?;
        let payload = conn.get::<_, Option<String>>(key).await.ok()??;
        match serde_json::from_str(&payload) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(error = ?err, key, "discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = ?err, key, "failed to encode cache entry");
                return;
            }
        };
        match self.client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                if let Err(err) = conn.set_ex::<_, _, ()>(key, payload, ttl_seconds).await {
                    warn!(error = ?err, key, "failed to write cache entry");
                }
            }
            Err(err) => warn!(error = ?err, "failed to connect to redis"),
        }
    }

    /// Deletes every key matching `pattern`.
    pub async fn delete_matching(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let keys: Vec<String> = {
            let iter = conn.scan_match::<_, String>(pattern).await?;
            iter.collect().await
        };
        if keys.is_empty() {
            return Ok(0);
        }
        conn.del::<_, ()>(&keys).await?;
        Ok(keys.len())
    }
}
