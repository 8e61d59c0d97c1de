//! Processed entity envelope
//!
//! Transformers turn raw page content into these envelopes; the processing
//! stage upserts them by natural key (`entity_type`, `slug`).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Kind of domain entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Act,
    Event,
    Venue,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Act => "act",
            EntityType::Event => "event",
            EntityType::Venue => "venue",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "act" => Ok(EntityType::Act),
            "event" => Ok(EntityType::Event),
            "venue" => Ok(EntityType::Venue),
            other => Err(format!("unknown entity type: {}", other)),
        }
    }
}

/// Typed entity produced by a transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEntity {
    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Natural key used for upserts
    pub slug: String,

    /// Type-specific payload
    pub data: serde_json::Value,

    /// SHA-256 hex digest of `data`
    pub content_hash: String,
}

impl ProcessedEntity {
    /// Builds an envelope, hashing the payload
    pub fn new(entity_type: EntityType, slug: impl Into<String>, data: serde_json::Value) -> Self {
        let content_hash = content_hash(data.to_string().as_bytes());
        Self {
            entity_type,
            slug: slug.into(),
            data,
            content_hash,
        }
    }
}

/// SHA-256 hex digest
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Lowercase, ASCII-alphanumeric, dash-separated natural key
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(ch.to_ascii_lowercase());
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }

    slug
}
