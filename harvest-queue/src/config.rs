//! Queue, backpressure and stage configuration
//!
//! All settings load from environment variables and fall back to defaults
//! when a variable is missing or unparsable. Call `validate()` after loading.

use harvest_core::domain::queue::QueueThresholds;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Reads and parses an environment variable, falling back to `default`
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Reads a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`)
pub fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Queue store connection and batch-dequeue timing
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Redis connection URL
    pub redis_url: String,

    /// Prefix for every queue key
    pub namespace: String,

    /// Longest a batch dequeue waits for the first item
    pub batch_dequeue_max_wait: Duration,

    /// Pause between polls while a batch dequeue waits
    pub batch_dequeue_delay_interval: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            namespace: "harvest".to_string(),
            batch_dequeue_max_wait: Duration::from_secs(5),
            batch_dequeue_delay_interval: Duration::from_millis(200),
        }
    }
}

impl QueueSettings {
    /// Expected environment variables (all optional):
    /// - REDIS_URL
    /// - QUEUE_NAMESPACE
    /// - QUEUE_BATCH_DEQUEUE_MAX_WAIT_SECONDS
    /// - QUEUE_BATCH_DEQUEUE_DELAY_INTERVAL_MS
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env_or("REDIS_URL", defaults.redis_url),
            namespace: env_or("QUEUE_NAMESPACE", defaults.namespace),
            batch_dequeue_max_wait: Duration::from_secs(env_or(
                "QUEUE_BATCH_DEQUEUE_MAX_WAIT_SECONDS",
                defaults.batch_dequeue_max_wait.as_secs(),
            )),
            batch_dequeue_delay_interval: Duration::from_millis(env_or(
                "QUEUE_BATCH_DEQUEUE_DELAY_INTERVAL_MS",
                defaults.batch_dequeue_delay_interval.as_millis() as u64,
            )),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            anyhow::bail!("redis_url must start with redis:// or rediss://");
        }
        if self.namespace.is_empty() {
            anyhow::bail!("queue namespace cannot be empty");
        }
        if self.batch_dequeue_delay_interval.is_zero() {
            anyhow::bail!("batch_dequeue_delay_interval must be greater than 0");
        }
        Ok(())
    }
}

/// Backpressure and adaptive batching switches
#[derive(Debug, Clone)]
pub struct BackPressureConfig {
    pub enable_back_pressure: bool,

    pub enable_adaptive_batching: bool,

    /// When set, a `Warning` downstream queue already pauses producers;
    /// otherwise only `Critical` does
    pub strict: bool,

    /// Per-queue thresholds; queues not listed use `QueueThresholds::default()`
    pub queue_thresholds: HashMap<String, QueueThresholds>,
}

impl Default for BackPressureConfig {
    fn default() -> Self {
        Self {
            enable_back_pressure: true,
            enable_adaptive_batching: true,
            strict: false,
            queue_thresholds: HashMap::new(),
        }
    }
}

impl BackPressureConfig {
    /// Expected environment variables (all optional):
    /// - BACKPRESSURE_ENABLED
    /// - BACKPRESSURE_ADAPTIVE_BATCHING
    /// - BACKPRESSURE_STRICT
    /// - QUEUE_THRESHOLDS (`name=warning:critical,...`)
    pub fn from_env() -> anyhow::Result<Self> {
        let queue_thresholds = match std::env::var("QUEUE_THRESHOLDS") {
            Ok(raw) => parse_thresholds(&raw)?,
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            enable_back_pressure: env_flag("BACKPRESSURE_ENABLED", true),
            enable_adaptive_batching: env_flag("BACKPRESSURE_ADAPTIVE_BATCHING", true),
            strict: env_flag("BACKPRESSURE_STRICT", false),
            queue_thresholds,
        })
    }

    pub fn with_thresholds(mut self, queue: &str, warning: u64, critical: u64) -> Self {
        self.queue_thresholds
            .insert(queue.to_string(), QueueThresholds::new(warning, critical));
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (queue, t) in &self.queue_thresholds {
            if t.critical == 0 {
                anyhow::bail!("critical threshold for '{}' must be greater than 0", queue);
            }
            if t.warning > t.critical {
                anyhow::bail!(
                    "warning threshold for '{}' ({}) exceeds critical ({})",
                    queue,
                    t.warning,
                    t.critical
                );
            }
        }
        Ok(())
    }
}

/// Parses `collection=100:500,transformation=50:200`
pub fn parse_thresholds(raw: &str) -> anyhow::Result<HashMap<String, QueueThresholds>> {
    let mut thresholds = HashMap::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, levels) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid threshold entry '{}'", entry))?;
        let (warning, critical) = levels
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("invalid threshold levels '{}'", levels))?;

        let warning: u64 = warning.trim().parse()?;
        let critical: u64 = critical.trim().parse()?;
        thresholds.insert(
            name.trim().to_string(),
            QueueThresholds::new(warning, critical),
        );
    }

    Ok(thresholds)
}

/// Loop cadence and batch bounds for one pipeline stage
#[derive(Debug, Clone)]
pub struct StageSettings {
    /// Base delay between iterations, scaled by the adaptive delay
    pub delay_interval: Duration,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    /// Items of one batch processed in parallel
    pub concurrency: usize,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            delay_interval: Duration::from_secs(5),
            min_batch_size: 1,
            max_batch_size: 10,
            concurrency: 4,
        }
    }
}

impl StageSettings {
    /// Loads `{PREFIX}_DELAY_INTERVAL_SECONDS`, `{PREFIX}_MIN_BATCH_SIZE`,
    /// `{PREFIX}_MAX_BATCH_SIZE` and `{PREFIX}_CONCURRENCY`
    pub fn from_env(prefix: &str, defaults: StageSettings) -> Self {
        Self {
            delay_interval: Duration::from_secs(env_or(
                &format!("{}_DELAY_INTERVAL_SECONDS", prefix),
                defaults.delay_interval.as_secs(),
            )),
            min_batch_size: env_or(
                &format!("{}_MIN_BATCH_SIZE", prefix),
                defaults.min_batch_size,
            ),
            max_batch_size: env_or(
                &format!("{}_MAX_BATCH_SIZE", prefix),
                defaults.max_batch_size,
            ),
            concurrency: env_or(&format!("{}_CONCURRENCY", prefix), defaults.concurrency),
        }
    }

    pub fn validate(&self, stage: &str) -> anyhow::Result<()> {
        if self.min_batch_size == 0 {
            anyhow::bail!("{}: min_batch_size must be greater than 0", stage);
        }
        if self.min_batch_size > self.max_batch_size {
            anyhow::bail!("{}: min_batch_size exceeds max_batch_size", stage);
        }
        if self.concurrency == 0 {
            anyhow::bail!("{}: concurrency must be greater than 0", stage);
        }
        if self.delay_interval > Duration::from_secs(3600) {
            anyhow::bail!("{}: delay_interval must be at most one hour", stage);
        }
        Ok(())
    }
}
