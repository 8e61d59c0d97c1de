//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository handles database operations for a specific domain entity.

pub mod entity;
pub mod execution;
pub mod schedule;
pub mod sitemap;

// Re-export for convenience
pub use entity as entity_repository;
pub use execution as execution_repository;
pub use schedule as schedule_repository;
pub use sitemap as sitemap_repository;
