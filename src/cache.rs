//! Thin key-value cache client.

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;

const KEY_PREFIX: &str = "storefront:";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Cache error: {0}")]
    Other(String),
}

/// String values with expiry, addressed by key.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError>;
    async fn del(&self, keys: &[String]) -> Result<(), CacheError>;
}

#[derive(Clone)]
pub struct RedisCache {
    redis_client: redis::Client,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self { redis_client })
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let reply = redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        if reply != "PONG" {
            return Err(CacheError::Other(format!("unexpected PING reply: {}", reply)));
        }
        Ok(())
    }
}

fn namespaced(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

#[async_trait]
impl KvCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(namespaced(key)).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: String, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(namespaced(key), value, ttl_secs).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let keys: Vec<String> = keys.iter().map(|k| namespaced(k)).collect();
        let _: () = conn.del(keys).await?;
        Ok(())
    }
}
