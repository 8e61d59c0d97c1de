//! Queue health monitoring
//!
//! Classifies queue depth against warning/critical thresholds and keeps
//! per-queue counters (enqueues, dequeues, errors, processing time). The
//! queue client feeds the counters; stages report processing time.

use chrono::Utc;
use dashmap::DashMap;
use harvest_core::domain::queue::{QueueHealth, QueueMetrics, QueueStatus, QueueThresholds};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::client::QueueConfig;
use crate::error::Result;
use crate::store::QueueStore;

pub struct QueueHealthMonitor {
    store: Arc<dyn QueueStore>,
    thresholds: HashMap<String, QueueThresholds>,
    metrics: DashMap<String, QueueMetrics>,
}

impl QueueHealthMonitor {
    pub fn new(store: Arc<dyn QueueStore>, thresholds: HashMap<String, QueueThresholds>) -> Self {
        Self {
            store,
            thresholds,
            metrics: DashMap::new(),
        }
    }

    /// Configured thresholds for a queue, or the defaults
    pub fn thresholds_for(&self, queue: &str) -> QueueThresholds {
        self.thresholds.get(queue).copied().unwrap_or_default()
    }

    /// Current depth of a queue
    pub async fn depth(&self, queue: &str) -> Result<u64> {
        match self.store.len(queue).await {
            Ok(depth) => Ok(depth),
            Err(e) => {
                self.record_error(queue);
                Err(e)
            }
        }
    }

    /// Classifies a queue's current depth against explicit thresholds
    pub async fn get_queue_status<T>(
        &self,
        queue: &QueueConfig<T>,
        warning_threshold: u64,
        critical_threshold: u64,
    ) -> Result<QueueStatus> {
        let depth = self.depth(queue.name()).await?;
        Ok(QueueThresholds::new(warning_threshold, critical_threshold).status_for(depth))
    }

    /// Classifies a queue's current depth against its configured thresholds
    pub async fn status(&self, queue: &str) -> Result<QueueStatus> {
        let depth = self.depth(queue).await?;
        Ok(self.thresholds_for(queue).status_for(depth))
    }

    /// Builds a full health report for a queue
    pub async fn health(&self, queue: &str) -> Result<QueueHealth> {
        let thresholds = self.thresholds_for(queue);
        let depth = self.depth(queue).await?;
        let metrics = self.metrics(queue);

        Ok(QueueHealth {
            queue_name: queue.to_string(),
            current_depth: depth,
            max_depth: thresholds.critical,
            status: thresholds.status_for(depth),
            processing_rate: metrics.processing_rate(),
            average_processing_time: metrics.average_processing_time(),
            error_count: metrics.error_count,
        })
    }

    /// Snapshot of a queue's counters
    pub fn metrics(&self, queue: &str) -> QueueMetrics {
        self.metrics
            .get(queue)
            .map(|m| m.value().clone())
            .unwrap_or_default()
    }

    pub fn record_enqueue(&self, queue: &str, count: usize) {
        let mut metrics = self.metrics.entry(queue.to_string()).or_default();
        metrics.enqueue_count += count as u64;
        metrics.last_enqueue = Some(Utc::now());
    }

    pub fn record_dequeue(&self, queue: &str, count: usize) {
        if count == 0 {
            return;
        }
        let mut metrics = self.metrics.entry(queue.to_string()).or_default();
        metrics.dequeue_count += count as u64;
        metrics.last_dequeue = Some(Utc::now());
    }

    pub fn record_error(&self, queue: &str) {
        self.metrics.entry(queue.to_string()).or_default().error_count += 1;
    }

    /// Records time spent processing `count` items taken from `queue`
    pub fn record_processing(&self, queue: &str, elapsed: Duration, count: usize) {
        let mut metrics = self.metrics.entry(queue.to_string()).or_default();
        metrics.total_processing_time += elapsed.as_millis() as u64;
        metrics.processed_count += count as u64;
    }
}
