//! Redis list queue store
//!
//! Each queue is a Redis list under `"{namespace}:{queue}"`: producers
//! `RPUSH`, consumers `LPOP key count`. Connections come from a
//! `deadpool-redis` pool.

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use tracing::debug;

use super::QueueStore;
use crate::error::{QueueError, Result};

pub struct RedisQueueStore {
    pool: Pool,
    namespace: String,
}

impl RedisQueueStore {
    /// Builds a pooled store. No connection is opened until first use.
    pub fn connect(redis_url: &str, namespace: &str) -> Result<Self> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(QueueError::unavailable)?;

        debug!("Redis queue store configured (namespace: {})", namespace);

        Ok(Self {
            pool,
            namespace: namespace.to_string(),
        })
    }

    fn key(&self, queue: &str) -> String {
        format!("{}:{}", self.namespace, queue)
    }

    async fn connection(&self) -> Result<Connection> {
        self.pool.get().await.map_err(QueueError::unavailable)
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn push(&self, queue: &str, items: Vec<String>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .rpush(self.key(queue), items)
            .await
            .map_err(QueueError::unavailable)?;
        Ok(())
    }

    async fn pop(&self, queue: &str, max: usize) -> Result<Vec<String>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        // LPOP with a count replies nil when the list is empty
        let popped: Option<Vec<String>> = redis::cmd("LPOP")
            .arg(self.key(queue))
            .arg(max)
            .query_async(&mut conn)
            .await
            .map_err(QueueError::unavailable)?;
        Ok(popped.unwrap_or_default())
    }

    async fn len(&self, queue: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn
            .llen(self.key(queue))
            .await
            .map_err(QueueError::unavailable)?;
        Ok(len)
    }

    async fn clear(&self, queue: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: i64 = conn
            .del(self.key(queue))
            .await
            .map_err(QueueError::unavailable)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        let store = RedisQueueStore::connect("redis://127.0.0.1:6379", "harvest").unwrap();
        assert_eq!(store.key("collection"), "harvest:collection");
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unavailable() {
        let store = RedisQueueStore::connect("redis://127.0.0.1:1", "harvest").unwrap();
        let err = store.len("collection").await.unwrap_err();
        assert!(err.is_transient());
    }
}
