//! Queue backends
//!
//! A store holds named FIFO lists of serialized items. It is the single
//! shared mutable resource between pipeline stages.

mod memory;
mod redis;

pub use self::memory::MemoryQueueStore;
pub use self::redis::RedisQueueStore;

use async_trait::async_trait;

use crate::error::Result;

/// List-style queue backend
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Appends items to the tail of a queue
    async fn push(&self, queue: &str, items: Vec<String>) -> Result<()>;

    /// Removes and returns up to `max` items from the head of a queue.
    /// Returns immediately with fewer (or zero) items if the queue is short.
    async fn pop(&self, queue: &str, max: usize) -> Result<Vec<String>>;

    /// Current number of items in a queue
    async fn len(&self, queue: &str) -> Result<u64>;

    /// Drops every item in a queue
    async fn clear(&self, queue: &str) -> Result<()>;
}
