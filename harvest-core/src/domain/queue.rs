//! Queue health types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health classification of a queue's depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QueueStatus {
    Healthy,
    Warning,
    Critical,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Healthy => write!(f, "Healthy"),
            QueueStatus::Warning => write!(f, "Warning"),
            QueueStatus::Critical => write!(f, "Critical"),
        }
    }
}

/// Depth thresholds for a named queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueThresholds {
    pub warning: u64,
    pub critical: u64,
}

impl Default for QueueThresholds {
    fn default() -> Self {
        Self {
            warning: 1000,
            critical: 5000,
        }
    }
}

impl QueueThresholds {
    pub fn new(warning: u64, critical: u64) -> Self {
        Self { warning, critical }
    }

    /// Classifies a depth: `>= critical` is Critical, `>= warning` is Warning
    pub fn status_for(&self, depth: u64) -> QueueStatus {
        if depth >= self.critical {
            QueueStatus::Critical
        } else if depth >= self.warning {
            QueueStatus::Warning
        } else {
            QueueStatus::Healthy
        }
    }

    /// Depth relative to the critical threshold, clamped to `[0, 1]`
    pub fn fill_ratio(&self, depth: u64) -> f64 {
        if self.critical == 0 {
            return 1.0;
        }
        (depth as f64 / self.critical as f64).clamp(0.0, 1.0)
    }
}

/// Point-in-time health report for a queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueHealth {
    pub queue_name: String,
    pub current_depth: u64,
    pub max_depth: u64,
    pub status: QueueStatus,
    /// Items processed per second of recorded processing time
    pub processing_rate: f64,
    /// Milliseconds
    pub average_processing_time: f64,
    pub error_count: u64,
}

/// Running counters for a queue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub enqueue_count: u64,
    pub dequeue_count: u64,
    pub error_count: u64,
    pub last_enqueue: Option<DateTime<Utc>>,
    pub last_dequeue: Option<DateTime<Utc>>,
    /// Milliseconds
    pub total_processing_time: u64,
    pub processed_count: u64,
}

impl QueueMetrics {
    /// Average processing time in milliseconds
    pub fn average_processing_time(&self) -> f64 {
        if self.processed_count == 0 {
            return 0.0;
        }
        self.total_processing_time as f64 / self.processed_count as f64
    }

    /// Items per second
    pub fn processing_rate(&self) -> f64 {
        if self.total_processing_time == 0 {
            return 0.0;
        }
        self.processed_count as f64 * 1000.0 / self.total_processing_time as f64
    }
}
