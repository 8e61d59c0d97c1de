//! Harvest Core
//!
//! Core types shared by the Harvest services.
//!
//! This crate contains:
//! - Domain types: the pipeline unit of work and its state machine, the
//!   entities it produces, schedules, executions and queue health
//! - DTOs: request/response shapes exchanged between orchestrator, runner and CLI

pub mod domain;
pub mod dto;
