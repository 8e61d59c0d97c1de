//! Collector/transformer adapters
//!
//! Each SKU maps to one collector (drives a page session to fetch raw
//! content) and one transformer (turns raw content into entities). The
//! registry is filled once at startup and only read afterwards.

pub mod json_ld;

use async_trait::async_trait;
use harvest_core::domain::entity::ProcessedEntity;
use std::collections::HashMap;
use std::sync::Arc;

use crate::browser::PageSession;

/// Fetches the raw payload for one URL
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self, url: &str, session: &PageSession) -> anyhow::Result<String>;
}

/// Converts a raw payload into entities
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, raw_data: &str) -> anyhow::Result<Vec<ProcessedEntity>>;
}

/// Collector/transformer pair for one SKU
#[derive(Clone)]
pub struct Adapter {
    pub collector: Arc<dyn Collector>,
    pub transformer: Arc<dyn Transformer>,
}

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Adapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every adapter shipped in this crate
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(
            json_ld::SKU,
            Arc::new(json_ld::JsonLdCollector),
            Arc::new(json_ld::JsonLdEventTransformer),
        );
        registry
    }

    /// Registers an adapter, replacing any previous one for `sku`
    pub fn register(
        &mut self,
        sku: impl Into<String>,
        collector: Arc<dyn Collector>,
        transformer: Arc<dyn Transformer>,
    ) -> &mut Self {
        self.adapters.insert(
            sku.into(),
            Adapter {
                collector,
                transformer,
            },
        );
        self
    }

    pub fn get(&self, sku: &str) -> Option<&Adapter> {
        self.adapters.get(sku)
    }

    pub fn collector(&self, sku: &str) -> Option<Arc<dyn Collector>> {
        self.get(sku).map(|a| a.collector.clone())
    }

    pub fn transformer(&self, sku: &str) -> Option<Arc<dyn Transformer>> {
        self.get(sku).map(|a| a.transformer.clone())
    }

    /// Registered SKU keys, sorted
    pub fn skus(&self) -> Vec<&str> {
        let mut skus: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        skus.sort_unstable();
        skus
    }
}
