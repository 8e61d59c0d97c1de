//! `json-ld-events`: schema.org events embedded as JSON-LD
//!
//! The collector loads the page in a browser so script-rendered markup is
//! included. The transformer reads every `application/ld+json` block and
//! maps `Event` objects (and subtypes such as `MusicEvent`) to Event, Venue
//! and Act entities.

use async_trait::async_trait;
use harvest_core::domain::entity::{EntityType, ProcessedEntity, slugify};
use scraper::{Html, Selector};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use tracing::debug;

use super::{Collector, Transformer};
use crate::browser::PageSession;

pub const SKU: &str = "json-ld-events";

pub struct JsonLdCollector;

#[async_trait]
impl Collector for JsonLdCollector {
    async fn collect(&self, url: &str, session: &PageSession) -> anyhow::Result<String> {
        session.fetch_html(url).await
    }
}

pub struct JsonLdEventTransformer;

#[async_trait]
impl Transformer for JsonLdEventTransformer {
    async fn transform(&self, raw_data: &str) -> anyhow::Result<Vec<ProcessedEntity>> {
        let blocks = extract_json_ld(raw_data);
        if blocks.is_empty() {
            anyhow::bail!("page has no JSON-LD blocks");
        }

        let mut events = Vec::new();
        for block in &blocks {
            collect_events(block, &mut events);
        }
        debug!("Found {} event object(s) in {} JSON-LD block(s)", events.len(), blocks.len());

        let mut builder = EntityBuilder::default();
        for event in events {
            builder.add_event(event);
        }
        Ok(builder.entities)
    }
}

/// Parses every JSON-LD script block, skipping invalid JSON
fn extract_json_ld(html: &str) -> Vec<Value> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("script[type='application/ld+json']") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|script| {
            let text = script.text().collect::<String>();
            match serde_json::from_str::<Value>(text.trim()) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!("Skipping invalid JSON-LD block: {}", e);
                    None
                }
            }
        })
        .collect()
}

/// Walks arrays and `@graph` containers looking for event objects
fn collect_events<'a>(value: &'a Value, out: &mut Vec<&'a Map<String, Value>>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_events(item, out);
            }
        }
        Value::Object(map) => {
            if is_event(map) {
                out.push(map);
            }
            if let Some(graph) = map.get("@graph") {
                collect_events(graph, out);
            }
        }
        _ => {}
    }
}

fn is_event(map: &Map<String, Value>) -> bool {
    let is_event_type = |t: &str| t.ends_with("Event");
    match map.get("@type") {
        Some(Value::String(t)) => is_event_type(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(is_event_type),
        _ => false,
    }
}

fn text(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `name` of a nested object, or the value itself when it is a plain string
fn name_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(map) => text(map, "name"),
        _ => None,
    }
}

fn one_or_many(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
        None => Vec::new(),
    }
}

fn address_of(location: &Value) -> Value {
    let Some(address) = location.get("address") else {
        return Value::Null;
    };
    match address {
        Value::String(s) => Value::String(s.trim().to_string()),
        Value::Object(map) => {
            let parts: Vec<String> = [
                "streetAddress",
                "addressLocality",
                "addressRegion",
                "postalCode",
                "addressCountry",
            ]
            .iter()
            .filter_map(|key| text(map, key))
            .collect();
            Value::String(parts.join(", "))
        }
        _ => Value::Null,
    }
}

/// Accumulates entities, keeping the first occurrence of each natural key
#[derive(Default)]
struct EntityBuilder {
    entities: Vec<ProcessedEntity>,
    seen: HashSet<(EntityType, String)>,
}

impl EntityBuilder {
    fn push(&mut self, entity_type: EntityType, slug: String, data: Value) {
        if slug.is_empty() || !self.seen.insert((entity_type, slug.clone())) {
            return;
        }
        self.entities.push(ProcessedEntity::new(entity_type, slug, data));
    }

    fn add_event(&mut self, event: &Map<String, Value>) {
        let Some(name) = text(event, "name") else {
            return;
        };
        let start_date = text(event, "startDate");

        let venue_slug = event.get("location").and_then(|location| {
            let venue_name = name_of(location)?;
            let slug = slugify(&venue_name);
            self.push(
                EntityType::Venue,
                slug.clone(),
                json!({ "name": venue_name, "address": address_of(location) }),
            );
            Some(slug)
        });

        let mut act_slugs = Vec::new();
        for performer in one_or_many(event.get("performer")) {
            let Some(act_name) = name_of(performer) else {
                continue;
            };
            let slug = slugify(&act_name);
            let url = performer.get("url").and_then(Value::as_str);
            self.push(EntityType::Act, slug.clone(), json!({ "name": act_name, "url": url }));
            if !slug.is_empty() {
                act_slugs.push(slug);
            }
        }

        // Same-named events on different days are different events
        let day = start_date.as_deref().map(|d| d.get(..10).unwrap_or(d));
        let slug = match day {
            Some(day) => slugify(&format!("{} {}", name, day)),
            None => slugify(&name),
        };

        self.push(
            EntityType::Event,
            slug,
            json!({
                "name": name,
                "startDate": start_date,
                "endDate": text(event, "endDate"),
                "url": text(event, "url"),
                "description": text(event, "description"),
                "venue": venue_slug,
                "acts": act_slugs,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(blocks: &[&str]) -> String {
        let scripts: String = blocks
            .iter()
            .map(|b| format!(r#"<script type="application/ld+json">{}</script>"#, b))
            .collect();
        format!("<html><head>{}</head><body></body></html>", scripts)
    }

    async fn transform(html: &str) -> anyhow::Result<Vec<ProcessedEntity>> {
        JsonLdEventTransformer.transform(html).await
    }

    fn find<'a>(entities: &'a [ProcessedEntity], t: EntityType, slug: &str) -> &'a ProcessedEntity {
        entities
            .iter()
            .find(|e| e.entity_type == t && e.slug == slug)
            .unwrap_or_else(|| panic!("missing {} {}", t, slug))
    }

    #[tokio::test]
    async fn test_event_with_venue_and_performers() {
        let html = page(&[r#"{
            "@context": "https://schema.org",
            "@type": "MusicEvent",
            "name": "Jazz Night",
            "startDate": "2026-11-02T20:00:00+01:00",
            "url": "https://example.com/jazz",
            "location": {
                "@type": "Place",
                "name": "Blue Room",
                "address": {"streetAddress": "1 Main St", "addressLocality": "Springfield"}
            },
            "performer": [
                {"@type": "MusicGroup", "name": "The Quartet", "url": "https://example.com/q"},
                "Solo Sam"
            ]
        }"#]);

        let entities = transform(&html).await.unwrap();
        assert_eq!(entities.len(), 4);

        let event = find(&entities, EntityType::Event, "jazz-night-2026-11-02");
        assert_eq!(event.data["venue"], "blue-room");
        assert_eq!(event.data["acts"], json!(["the-quartet", "solo-sam"]));

        let venue = find(&entities, EntityType::Venue, "blue-room");
        assert_eq!(venue.data["address"], "1 Main St, Springfield");

        let act = find(&entities, EntityType::Act, "the-quartet");
        assert_eq!(act.data["url"], "https://example.com/q");
        assert_eq!(act.content_hash.len(), 64);
    }

    #[tokio::test]
    async fn test_graph_and_shared_venue_deduplicated() {
        let html = page(&[
            r#"{"@graph": [
                {"@type": "Organization", "name": "Promoter"},
                {"@type": "Event", "name": "Open Mic", "startDate": "2026-11-03",
                 "location": {"name": "Blue Room"}},
                {"@type": ["Event", "Thing"], "name": "Open Mic", "startDate": "2026-11-10",
                 "location": {"name": "Blue Room"}}
            ]}"#,
            "not json at all",
        ]);

        let entities = transform(&html).await.unwrap();
        let venues = entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Venue)
            .count();
        let events = entities
            .iter()
            .filter(|e| e.entity_type == EntityType::Event)
            .count();
        assert_eq!(venues, 1);
        assert_eq!(events, 2);
    }

    #[tokio::test]
    async fn test_page_without_events_yields_nothing() {
        let html = page(&[r#"{"@type": "WebSite", "name": "Example"}"#]);
        assert!(transform(&html).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_page_without_json_ld_is_an_error() {
        assert!(transform("<html><body>hi</body></html>").await.is_err());
    }

    #[tokio::test]
    async fn test_nameless_event_is_skipped() {
        let html = page(&[r#"[{"@type": "Event"}, {"@type": "Event", "name": "Quiz"}]"#]);
        let entities = transform(&html).await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].slug, "quiz");
    }
}
