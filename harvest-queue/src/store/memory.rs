//! In-process queue store
//!
//! Used by tests and single-process deployments. Items live only as long as
//! the store does.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use super::QueueStore;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn push(&self, queue: &str, items: Vec<String>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut queues = self.queues.lock();
        queues.entry(queue.to_string()).or_default().extend(items);
        Ok(())
    }

    async fn pop(&self, queue: &str, max: usize) -> Result<Vec<String>> {
        let mut queues = self.queues.lock();
        let Some(list) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };
        let take = max.min(list.len());
        Ok(list.drain(..take).collect())
    }

    async fn len(&self, queue: &str) -> Result<u64> {
        let queues = self.queues.lock();
        Ok(queues.get(queue).map_or(0, |list| list.len() as u64))
    }

    async fn clear(&self, queue: &str) -> Result<()> {
        self.queues.lock().remove(queue);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let store = MemoryQueueStore::new();
        store
            .push("q", vec!["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();

        assert_eq!(store.pop("q", 2).await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.len("q").await.unwrap(), 1);
        assert_eq!(store.pop("q", 5).await.unwrap(), vec!["c"]);
        assert!(store.pop("q", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let store = MemoryQueueStore::new();
        store.push("a", vec!["1".into()]).await.unwrap();
        store.push("b", vec!["2".into(), "3".into()]).await.unwrap();
        store.clear("b").await.unwrap();

        assert_eq!(store.len("a").await.unwrap(), 1);
        assert_eq!(store.len("b").await.unwrap(), 0);
        assert_eq!(store.len("missing").await.unwrap(), 0);
    }
}
