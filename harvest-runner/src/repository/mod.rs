//! Repository layer
//!
//! The runner never talks to the database. Entity persistence goes through
//! the orchestrator's entity endpoints behind a narrow trait, so stage tests
//! can swap in an in-memory store.

mod entities;

pub use entities::{EntityRepository, HttpEntityRepository};

#[cfg(test)]
pub use entities::InMemoryEntityRepository;
