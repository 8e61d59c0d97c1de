//! Chromium over the Chrome DevTools Protocol

use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{BrowserContext, BrowserDriver, BrowserInstance, PageHandle};

/// Launches local Chromium processes
pub struct ChromiumDriver {
    headless: bool,
}

impl ChromiumDriver {
    pub fn new(headless: bool) -> Self {
        Self { headless }
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn launch(&self) -> anyhow::Result<Arc<dyn BrowserInstance>> {
        let mut builder = BrowserConfig::builder();
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(|e| anyhow!(e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch chromium")?;

        // The CDP connection only makes progress while its handler is polled
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Chromium handler stopped: {}", e);
                    break;
                }
            }
        });

        Ok(Arc::new(ChromiumInstance {
            browser: Arc::new(Mutex::new(browser)),
            handler_task,
        }))
    }
}

struct ChromiumInstance {
    browser: Arc<Mutex<Browser>>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserInstance for ChromiumInstance {
    async fn new_context(&self) -> anyhow::Result<Box<dyn BrowserContext>> {
        let id = self
            .browser
            .lock()
            .await
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .context("failed to create browser context")?;

        Ok(Box::new(ChromiumContext {
            browser: self.browser.clone(),
            id,
        }))
    }

    async fn close(&self) -> anyhow::Result<()> {
        let mut browser = self.browser.lock().await;
        let closed = browser.close().await.map(|_| ());
        if let Err(e) = browser.wait().await {
            warn!("Chromium process did not exit cleanly: {}", e);
        }
        self.handler_task.abort();
        closed.context("failed to close chromium")
    }
}

struct ChromiumContext {
    browser: Arc<Mutex<Browser>>,
    id: BrowserContextId,
}

#[async_trait]
impl BrowserContext for ChromiumContext {
    async fn new_page(&self) -> anyhow::Result<Box<dyn PageHandle>> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.id.clone())
            .build()
            .map_err(|e| anyhow!(e))?;

        let page = self
            .browser
            .lock()
            .await
            .new_page(params)
            .await
            .context("failed to open page")?;

        Ok(Box::new(ChromiumPage { page }))
    }

    async fn dispose(self: Box<Self>) -> anyhow::Result<()> {
        self.browser
            .lock()
            .await
            .dispose_browser_context(self.id.clone())
            .await
            .context("failed to dispose browser context")
    }
}

struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn goto(&self, url: &str, timeout: Duration) -> anyhow::Result<()> {
        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(timeout, navigation).await {
            Ok(result) => result.with_context(|| format!("navigation to {} failed", url)),
            Err(_) => Err(anyhow!("navigation to {} timed out after {:?}", url, timeout)),
        }
    }

    async fn content(&self) -> anyhow::Result<String> {
        self.page
            .content()
            .await
            .context("failed to read page content")
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        self.page.close().await.context("failed to close page")
    }
}
