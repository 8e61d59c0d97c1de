//! Backpressure and adaptive batching
//!
//! A producing stage checks the health of the queue it is about to write
//! into and pauses while that queue is overloaded. Batch size and loop delay
//! adapt to the depth of the queue a stage reads from:
//!
//! - batch size shrinks linearly as the queue fills:
//!   `max - (max - min) * fill`, clamped to `[min, max]`
//! - delay grows as the queue empties: `base * (2.0 - 1.9 * fill)`, so it
//!   stays within `[0.1 * base, 2 * base]`
//!
//! `fill` is depth divided by the queue's critical threshold, clamped to
//! `[0, 1]`.

use harvest_core::domain::queue::QueueStatus;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::client::QueueConfig;
use crate::config::BackPressureConfig;
use crate::error::Result;
use crate::health::QueueHealthMonitor;

const MAX_DELAY_FACTOR: f64 = 2.0;
const MIN_DELAY_FACTOR: f64 = 0.1;

pub struct BackPressureManager {
    monitor: Arc<QueueHealthMonitor>,
    config: BackPressureConfig,
}

impl BackPressureManager {
    pub fn new(monitor: Arc<QueueHealthMonitor>, config: BackPressureConfig) -> Self {
        Self { monitor, config }
    }

    pub fn monitor(&self) -> &Arc<QueueHealthMonitor> {
        &self.monitor
    }

    /// Whether a producer should hold off writing into `downstream`
    pub async fn should_apply_back_pressure<T>(&self, downstream: &QueueConfig<T>) -> Result<bool> {
        if !self.config.enable_back_pressure {
            return Ok(false);
        }

        let status = self.monitor.status(downstream.name()).await?;
        let pause = match status {
            QueueStatus::Critical => true,
            QueueStatus::Warning => self.config.strict,
            QueueStatus::Healthy => false,
        };

        if pause {
            debug!(
                "Backpressure on '{}' (status: {})",
                downstream.name(),
                status
            );
        }
        Ok(pause)
    }

    /// Batch size for the next dequeue from `queue`
    pub async fn calculate_adaptive_batch_size<T>(
        &self,
        queue: &QueueConfig<T>,
        min_batch_size: usize,
        max_batch_size: usize,
    ) -> Result<usize> {
        if !self.config.enable_adaptive_batching {
            return Ok(max_batch_size.max(min_batch_size));
        }

        let fill = self.fill_ratio(queue.name()).await?;
        Ok(adaptive_batch_size(fill, min_batch_size, max_batch_size))
    }

    /// Delay before a stage reading from `queue` iterates again
    pub async fn calculate_adaptive_delay<T>(
        &self,
        queue: &QueueConfig<T>,
        base_delay: Duration,
    ) -> Result<Duration> {
        if !self.config.enable_adaptive_batching {
            return Ok(base_delay);
        }

        let fill = self.fill_ratio(queue.name()).await?;
        Ok(adaptive_delay(fill, base_delay))
    }

    async fn fill_ratio(&self, queue: &str) -> Result<f64> {
        let depth = self.monitor.depth(queue).await?;
        Ok(self.monitor.thresholds_for(queue).fill_ratio(depth))
    }
}

/// `max - (max - min) * fill`, rounded and clamped to `[min, max]`
pub fn adaptive_batch_size(fill_ratio: f64, min_batch_size: usize, max_batch_size: usize) -> usize {
    let (min, max) = if min_batch_size <= max_batch_size {
        (min_batch_size, max_batch_size)
    } else {
        (max_batch_size, min_batch_size)
    };
    let fill = sanitize(fill_ratio);

    let size = max as f64 - (max - min) as f64 * fill;
    (size.round() as usize).clamp(min, max)
}

/// `base * (2.0 - 1.9 * fill)`
pub fn adaptive_delay(fill_ratio: f64, base_delay: Duration) -> Duration {
    let fill = sanitize(fill_ratio);
    let factor = MAX_DELAY_FACTOR - (MAX_DELAY_FACTOR - MIN_DELAY_FACTOR) * fill;
    Duration::from_secs_f64(base_delay.as_secs_f64() * factor)
}

fn sanitize(fill_ratio: f64) -> f64 {
    if fill_ratio.is_nan() {
        1.0
    } else {
        fill_ratio.clamp(0.0, 1.0)
    }
}
