//! Common types used across CLI modules

use uuid::Uuid;

/// Identifier that can be either a full UUID or an unambiguous prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrPrefix {
    /// Full UUID
    Full(Uuid),
    /// Lowercased prefix that should uniquely identify a resource
    Prefix(String),
}

impl IdOrPrefix {
    /// Parses a full UUID first, otherwise treats the input as a prefix
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match Uuid::parse_str(input) {
            Ok(uuid) => IdOrPrefix::Full(uuid),
            Err(_) => IdOrPrefix::Prefix(input.to_lowercase()),
        }
    }

    /// Get the UUID if this is a full ID
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            IdOrPrefix::Full(uuid) => Some(*uuid),
            IdOrPrefix::Prefix(_) => None,
        }
    }

    /// Whether `id` is this identifier or starts with this prefix
    pub fn matches(&self, id: &Uuid) -> bool {
        match self {
            IdOrPrefix::Full(uuid) => uuid == id,
            IdOrPrefix::Prefix(prefix) => id.to_string().starts_with(prefix.as_str()),
        }
    }
}

impl std::fmt::Display for IdOrPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdOrPrefix::Full(uuid) => write!(f, "{}", uuid),
            IdOrPrefix::Prefix(prefix) => write!(f, "{}", prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let uuid = Uuid::new_v4();
        assert_eq!(IdOrPrefix::parse(&uuid.to_string()), IdOrPrefix::Full(uuid));
        assert_eq!(IdOrPrefix::parse(" 3F2A "), IdOrPrefix::Prefix("3f2a".into()));
    }

    #[test]
    fn test_matches() {
        let uuid = Uuid::parse_str("3f2a9c1e-0000-4000-8000-000000000000").unwrap();
        assert!(IdOrPrefix::parse("3f2a").matches(&uuid));
        assert!(IdOrPrefix::parse("3F2A9C").matches(&uuid));
        assert!(!IdOrPrefix::parse("3f2b").matches(&uuid));
        assert!(IdOrPrefix::Full(uuid).matches(&uuid));
    }
}
