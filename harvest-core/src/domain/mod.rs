//! Core domain types
//!
//! These types are shared between the orchestrator (which persists schedules,
//! executions and entities) and the runner (which moves pipeline contexts
//! through the collection, transformation and processing stages).

pub mod context;
pub mod entity;
pub mod execution;
pub mod queue;
pub mod schedule;
