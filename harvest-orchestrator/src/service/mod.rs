//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories and contain domain logic.

pub mod cron;
pub mod dispatch;
pub mod entity;
pub mod execution;
pub mod schedule;
pub mod sitemap;

// Re-export for convenience
pub use entity as entity_service;
pub use execution as execution_service;
pub use schedule as schedule_service;
