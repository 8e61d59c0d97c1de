//! Queue client
//!
//! Typed enqueue/dequeue over a `QueueStore`. A `QueueConfig<T>` binds a
//! queue name to the element type it carries, so a stage cannot push a value
//! of the wrong type onto a queue.
//!
//! The client never retries on its own: store failures surface as
//! `QueueError::Unavailable` and are counted by the health monitor.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::QueueSettings;
use crate::error::Result;
use crate::health::QueueHealthMonitor;
use crate::store::QueueStore;

/// Handle for a named queue carrying `T`
pub struct QueueConfig<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QueueConfig<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for QueueConfig<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for QueueConfig<T> {}

impl<T> fmt::Debug for QueueConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueueConfig").field(&self.name).finish()
    }
}

/// The pipeline's queues
pub mod queues {
    use super::QueueConfig;
    use harvest_core::domain::context::PipelineContext;

    pub const COLLECTION: &str = "collection";
    pub const TRANSFORMATION: &str = "transformation";
    pub const PROCESSING: &str = "processing";
    pub const FAILED: &str = "failed";

    /// Every queue, in pipeline order
    pub const ALL: [&str; 4] = [COLLECTION, TRANSFORMATION, PROCESSING, FAILED];

    /// Seeded contexts waiting for collection
    pub const fn collection() -> QueueConfig<PipelineContext> {
        QueueConfig::new(COLLECTION)
    }

    /// Collected contexts waiting for transformation
    pub const fn transformation() -> QueueConfig<PipelineContext> {
        QueueConfig::new(TRANSFORMATION)
    }

    /// Transformed contexts waiting for persistence
    pub const fn processing() -> QueueConfig<PipelineContext> {
        QueueConfig::new(PROCESSING)
    }

    /// Contexts that ended in `Failed`, kept for inspection and replay
    pub const fn failed() -> QueueConfig<PipelineContext> {
        QueueConfig::new(FAILED)
    }
}

/// Typed client over a shared queue store
#[derive(Clone)]
pub struct QueueClient {
    store: Arc<dyn QueueStore>,
    settings: QueueSettings,
    monitor: Arc<QueueHealthMonitor>,
}

impl QueueClient {
    pub fn new(
        store: Arc<dyn QueueStore>,
        settings: QueueSettings,
        monitor: Arc<QueueHealthMonitor>,
    ) -> Self {
        Self {
            store,
            settings,
            monitor,
        }
    }

    pub fn monitor(&self) -> &Arc<QueueHealthMonitor> {
        &self.monitor
    }

    pub async fn enqueue<T: Serialize>(&self, queue: &QueueConfig<T>, item: &T) -> Result<()> {
        self.enqueue_batch(queue, std::slice::from_ref(item)).await
    }

    pub async fn enqueue_batch<T: Serialize>(
        &self,
        queue: &QueueConfig<T>,
        items: &[T],
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let encoded = items
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.observe(queue.name(), self.store.push(queue.name(), encoded).await)?;
        self.monitor.record_enqueue(queue.name(), items.len());
        debug!("Enqueued {} item(s) to '{}'", items.len(), queue.name());
        Ok(())
    }

    /// Takes one item, if any, without waiting
    pub async fn dequeue<T: DeserializeOwned>(&self, queue: &QueueConfig<T>) -> Result<Option<T>> {
        let raw = self.observe(queue.name(), self.store.pop(queue.name(), 1).await)?;
        Ok(self.decode(queue.name(), raw).into_iter().next())
    }

    /// Takes up to `max_count` items
    ///
    /// Polls every `batch_dequeue_delay_interval` until at least one item
    /// arrives, then keeps draining until `max_count` is reached or the queue
    /// runs dry. Never waits longer than `batch_dequeue_max_wait`, and returns
    /// whatever it has as soon as `cancel` fires. A store error after some
    /// items were taken ends the batch early instead of failing it.
    pub async fn dequeue_batch<T: DeserializeOwned>(
        &self,
        queue: &QueueConfig<T>,
        max_count: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>> {
        let mut items = Vec::with_capacity(max_count);
        if max_count == 0 {
            return Ok(items);
        }

        let deadline = Instant::now() + self.settings.batch_dequeue_max_wait;

        loop {
            let remaining = max_count - items.len();
            let raw = match self.store.pop(queue.name(), remaining).await {
                Ok(raw) => raw,
                Err(e) if !items.is_empty() => {
                    // Earlier pops already removed these items from the store
                    self.monitor.record_error(queue.name());
                    warn!(
                        "Pop from '{}' failed, returning {} item(s) already taken: {}",
                        queue.name(),
                        items.len(),
                        e
                    );
                    break;
                }
                Err(e) => {
                    self.monitor.record_error(queue.name());
                    return Err(e);
                }
            };
            let popped = raw.len();
            items.extend(self.decode(queue.name(), raw));

            if items.len() >= max_count || (popped == 0 && !items.is_empty()) {
                break;
            }
            if Instant::now() >= deadline {
                break;
            }
            if popped > 0 {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.batch_dequeue_delay_interval) => {}
            }
        }

        Ok(items)
    }

    pub async fn length<T>(&self, queue: &QueueConfig<T>) -> Result<u64> {
        self.observe(queue.name(), self.store.len(queue.name()).await)
    }

    pub async fn clear<T>(&self, queue: &QueueConfig<T>) -> Result<()> {
        self.observe(queue.name(), self.store.clear(queue.name()).await)
    }

    fn observe<R>(&self, queue: &str, result: Result<R>) -> Result<R> {
        if result.is_err() {
            self.monitor.record_error(queue);
        }
        result
    }

    fn decode<T: DeserializeOwned>(&self, queue: &str, raw: Vec<String>) -> Vec<T> {
        let count = raw.len();
        let decoded: Vec<T> = raw
            .into_iter()
            .filter_map(|payload| match serde_json::from_str(&payload) {
                Ok(item) => Some(item),
                Err(e) => {
                    // Undecodable payloads can never be processed; drop them loudly
                    error!("Dropping undecodable item from '{}': {}", queue, e);
                    self.monitor.record_error(queue);
                    None
                }
            })
            .collect();
        self.monitor.record_dequeue(queue, count);
        decoded
    }
}
