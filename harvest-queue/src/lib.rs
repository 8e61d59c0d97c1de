//! Harvest Queue
//!
//! Typed work queues shared by the pipeline stages, plus the health
//! monitoring and backpressure control that decide how fast each stage
//! drains them.
//!
//! - `client`: `QueueConfig<T>` handles and the `QueueClient`
//! - `store`: queue backends (Redis lists, in-memory)
//! - `health`: depth classification and per-queue counters
//! - `backpressure`: pause decisions, adaptive batch size and delay
//! - `config`: queue, backpressure and stage settings

pub mod backpressure;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod store;

pub use backpressure::BackPressureManager;
pub use client::{QueueClient, QueueConfig, queues};
pub use config::{BackPressureConfig, QueueSettings, StageSettings};
pub use error::{QueueError, Result};
pub use health::QueueHealthMonitor;
pub use store::{MemoryQueueStore, QueueStore, RedisQueueStore};
