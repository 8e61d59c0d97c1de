//! Data Transfer Objects for inter-service communication
//!
//! Request/response shapes exchanged between the orchestrator API, the
//! runner and the CLI.

pub mod entity;
pub mod job;
pub mod schedule;
