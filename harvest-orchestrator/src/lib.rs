//! Harvest Orchestrator
//!
//! Owns the persistent state of the pipeline (schedules, sitemaps,
//! executions, entities), dispatches due schedules into the collection
//! queue and serves the HTTP API used by the runner and the CLI.

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;
pub mod state;
