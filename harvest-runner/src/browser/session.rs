//! Web page sessions
//!
//! A session is one page opened inside a pooled context. Opening a session
//! takes a context from the pool; closing it closes the page and hands the
//! context back. `with_session` wraps both around a closure so the page is
//! closed and the context released on every path, including errors and
//! panics.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::pool::{BrowserResourceManager, PoolError, PooledContext};
use super::PageHandle;

/// One open page and the pooled context it lives in
pub struct PageSession {
    page: Box<dyn PageHandle>,
    context: PooledContext,
    timeout: Duration,
}

impl PageSession {
    pub fn page(&self) -> &dyn PageHandle {
        self.page.as_ref()
    }

    /// Navigates to `url` and returns the rendered HTML
    pub async fn fetch_html(&self, url: &str) -> anyhow::Result<String> {
        let page = self.page();
        page.goto(url, self.timeout).await?;
        page.content().await
    }
}

#[derive(Clone)]
pub struct WebPageSessionProvider {
    pool: Arc<BrowserResourceManager>,
    page_timeout: Duration,
}

impl WebPageSessionProvider {
    pub fn new(pool: Arc<BrowserResourceManager>, page_timeout: Duration) -> Self {
        Self { pool, page_timeout }
    }

    /// Acquires a context and opens a page in it
    ///
    /// If the page cannot be created the context goes straight back to the
    /// pool.
    pub async fn open_session(&self, cancel: &CancellationToken) -> Result<PageSession, PoolError> {
        let context = self.pool.acquire_context(cancel).await?;

        match context.context().new_page().await {
            Ok(page) => Ok(PageSession {
                page,
                context,
                timeout: self.page_timeout,
            }),
            Err(e) => {
                self.pool.release_context(context).await;
                Err(PoolError::Context(e.context("failed to open page")))
            }
        }
    }

    /// Closes the page and releases its context
    pub async fn close_session(&self, session: PageSession) {
        let PageSession { page, context, .. } = session;
        if let Err(e) = page.close().await {
            warn!("Failed to close page: {:#}", e);
        }
        self.pool.release_context(context).await;
    }

    /// Runs `f` inside a fresh session and always closes it afterwards
    ///
    /// A panic inside `f` is re-raised once the session is closed.
    pub async fn with_session<T, E, F>(&self, cancel: &CancellationToken, f: F) -> Result<T, E>
    where
        E: From<PoolError>,
        F: for<'s> FnOnce(&'s PageSession) -> BoxFuture<'s, Result<T, E>>,
    {
        let session = self.open_session(cancel).await?;
        let result = AssertUnwindSafe(f(&session)).catch_unwind().await;
        self.close_session(session).await;
        match result {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::pool::tests::fake_pool;
    use crate::config::ContextStrategy;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_session_fetches_html_and_releases_context() {
        let (pool, counters) = fake_pool(1, 1, ContextStrategy::Reuse, "<html>ok</html>");
        let provider = WebPageSessionProvider::new(pool.clone(), Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let html = provider
            .with_session(&cancel, |session| {
                session.fetch_html("https://example.com").boxed()
            })
            .await
            .unwrap();

        assert_eq!(html, "<html>ok</html>");
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(counters.open_pages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_navigation_still_releases_context() {
        let (pool, counters) = fake_pool(1, 1, ContextStrategy::Reuse, "<html></html>");
        let provider = WebPageSessionProvider::new(pool.clone(), Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let result = provider
            .with_session(&cancel, |session| {
                session.fetch_html("https://unreachable.example").boxed()
            })
            .await;

        assert!(result.is_err());
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(counters.open_pages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panic_inside_session_still_closes_page() {
        let (pool, counters) = fake_pool(1, 1, ContextStrategy::Recycle, "<html></html>");
        let provider = WebPageSessionProvider::new(pool.clone(), Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let outcome = AssertUnwindSafe(provider.with_session(&cancel, |_session| {
            async move {
                if true {
                    panic!("extractor bug");
                }
                anyhow::Ok(())
            }
            .boxed()
        }))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert_eq!(counters.open_pages.load(Ordering::SeqCst), 0);
        assert_eq!(counters.live_contexts.load(Ordering::SeqCst), 0);
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(pool.stats().contexts_disposed, 1);
    }

    #[tokio::test]
    async fn test_page_creation_failure_releases_context() {
        let (pool, counters) = fake_pool(1, 1, ContextStrategy::Reuse, "");
        counters.fail_new_page.store(true, Ordering::SeqCst);
        let provider = WebPageSessionProvider::new(pool.clone(), Duration::from_secs(5));
        let cancel = CancellationToken::new();

        assert!(provider.open_session(&cancel).await.is_err());
        assert_eq!(pool.stats().in_use, 0);
        assert_eq!(pool.stats().idle_contexts, 1);

        counters.fail_new_page.store(false, Ordering::SeqCst);
        let session = provider.open_session(&cancel).await.unwrap();
        provider.close_session(session).await;
    }

    #[tokio::test]
    async fn test_open_pages_never_exceed_capacity() {
        let (pool, counters) = fake_pool(2, 3, ContextStrategy::Reuse, "<html></html>");
        let provider = WebPageSessionProvider::new(pool.clone(), Duration::from_secs(5));
        let cancel = CancellationToken::new();

        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let provider = provider.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let url = format!("https://example.com/{}", i);
                    provider
                        .with_session(&cancel, |session| {
                            async move { session.fetch_html(&url).await }.boxed()
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let peak = counters.max_open_pages.load(Ordering::SeqCst);
        assert!(peak <= 6, "peak {} exceeded capacity", peak);
        assert!(peak > 1);
        assert_eq!(pool.stats().in_use, 0);
        assert!(pool.stats().contexts_created <= 6);
    }
}
