//! Browser layer
//!
//! The collection stage drives headless browser pages through these traits.
//! `chromium` implements them over the Chrome DevTools Protocol; tests use
//! in-memory fakes.
//!
//! - `pool`: the bounded Browser Resource Manager
//! - `session`: scoped page sessions on top of the pool

pub mod chromium;
pub mod pool;
pub mod session;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use chromium::ChromiumDriver;
pub use pool::{BrowserResourceManager, PoolError, PoolStats, PooledContext};
pub use session::{PageSession, WebPageSessionProvider};

/// Launches browser instances
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self) -> anyhow::Result<Arc<dyn BrowserInstance>>;
}

/// A running browser
#[async_trait]
pub trait BrowserInstance: Send + Sync {
    /// Creates an isolated context (separate cookies and storage)
    async fn new_context(&self) -> anyhow::Result<Box<dyn BrowserContext>>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// An isolated browsing context owned by one browser
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn new_page(&self) -> anyhow::Result<Box<dyn PageHandle>>;

    async fn dispose(self: Box<Self>) -> anyhow::Result<()>;
}

/// One open page
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigates and waits for the load to finish, bounded by `timeout`
    async fn goto(&self, url: &str, timeout: Duration) -> anyhow::Result<()>;

    /// Current document HTML
    async fn content(&self) -> anyhow::Result<String>;

    async fn close(self: Box<Self>) -> anyhow::Result<()>;
}
