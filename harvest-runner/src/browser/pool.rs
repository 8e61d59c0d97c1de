//! Browser Resource Manager
//!
//! Bounds the number of concurrently open pages to
//! `browser_concurrency * context_concurrency` while reusing browsers and
//! contexts across sessions.
//!
//! Each browser slot owns a bag of idle contexts and a semaphore with
//! `context_concurrency` permits. A pool-wide semaphore with the total
//! capacity sits in front of the slots: holding a pool permit guarantees
//! that at least one slot permit is free, so acquisition waits on a single
//! semaphore and never spins.
//!
//! `acquire_context` and `release_context` are the only ways in and out.
//! A `PooledContext` dropped without release still returns its permits; the
//! context itself is then discarded.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BrowserContext, BrowserDriver, BrowserInstance};
use crate::config::{BrowserSettings, ContextStrategy};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("context acquisition cancelled")]
    Cancelled,

    #[error("browser pool is shut down")]
    Closed,

    #[error("failed to create browser context: {0:#}")]
    Context(anyhow::Error),
}

/// Snapshot of pool usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub in_use: usize,
    pub idle_contexts: usize,
    pub contexts_created: usize,
    pub contexts_disposed: usize,
}

struct BrowserSlot {
    instance: Arc<dyn BrowserInstance>,
    idle: Mutex<Vec<Box<dyn BrowserContext>>>,
    permits: Arc<Semaphore>,
}

/// A context checked out of the pool
///
/// Holds its slot and pool permits until released or dropped.
pub struct PooledContext {
    context: Option<Box<dyn BrowserContext>>,
    slot: usize,
    _slot_permit: OwnedSemaphorePermit,
    _pool_permit: OwnedSemaphorePermit,
}

impl PooledContext {
    pub fn context(&self) -> &dyn BrowserContext {
        match &self.context {
            Some(context) => context.as_ref(),
            None => unreachable!("context is only taken on release"),
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }
}

pub struct BrowserResourceManager {
    slots: Vec<BrowserSlot>,
    pool_permits: Arc<Semaphore>,
    strategy: ContextStrategy,
    capacity: usize,
    next_slot: AtomicUsize,
    created: AtomicUsize,
    disposed: AtomicUsize,
    closed: AtomicBool,
}

impl BrowserResourceManager {
    /// Launches `browser_concurrency` browsers through `driver`
    pub async fn launch(
        driver: Arc<dyn BrowserDriver>,
        settings: &BrowserSettings,
    ) -> anyhow::Result<Self> {
        let mut instances = Vec::with_capacity(settings.browser_concurrency);
        for i in 0..settings.browser_concurrency {
            match driver.launch().await {
                Ok(instance) => instances.push(instance),
                Err(e) => {
                    for instance in &instances {
                        if let Err(close_err) = instance.close().await {
                            warn!("Failed to close browser after launch error: {}", close_err);
                        }
                    }
                    return Err(e.context(format!("failed to launch browser {}", i)));
                }
            }
        }

        info!(
            "Browser pool ready: {} browser(s) x {} context(s), strategy {:?}",
            settings.browser_concurrency, settings.context_concurrency, settings.context_strategy
        );

        Ok(Self::with_instances(
            instances,
            settings.context_concurrency,
            settings.context_strategy,
        ))
    }

    /// Builds a pool over already running browsers
    pub fn with_instances(
        instances: Vec<Arc<dyn BrowserInstance>>,
        context_concurrency: usize,
        strategy: ContextStrategy,
    ) -> Self {
        let capacity = instances.len() * context_concurrency;
        let slots = instances
            .into_iter()
            .map(|instance| BrowserSlot {
                instance,
                idle: Mutex::new(Vec::new()),
                permits: Arc::new(Semaphore::new(context_concurrency)),
            })
            .collect();

        Self {
            slots,
            pool_permits: Arc::new(Semaphore::new(capacity)),
            strategy,
            capacity,
            next_slot: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            disposed: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Waits for a free slot, then hands out an idle context or creates one
    pub async fn acquire_context(
        &self,
        cancel: &CancellationToken,
    ) -> Result<PooledContext, PoolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        let pool_permit = tokio::select! {
            _ = cancel.cancelled() => return Err(PoolError::Cancelled),
            permit = self.pool_permits.clone().acquire_owned() => {
                permit.map_err(|_| PoolError::Closed)?
            }
        };

        let (slot, slot_permit) = self.claim_slot().ok_or(PoolError::Closed)?;
        let idle = self.slots[slot].idle.lock().pop();

        let context = match idle {
            Some(context) => context,
            None => {
                let context = self.slots[slot]
                    .instance
                    .new_context()
                    .await
                    .map_err(PoolError::Context)?;
                self.created.fetch_add(1, Ordering::Relaxed);
                debug!("Created browser context on browser {}", slot);
                context
            }
        };

        Ok(PooledContext {
            context: Some(context),
            slot,
            _slot_permit: slot_permit,
            _pool_permit: pool_permit,
        })
    }

    /// Returns a context to its slot, or disposes it under `Recycle`
    pub async fn release_context(&self, mut pooled: PooledContext) {
        let Some(context) = pooled.context.take() else {
            return;
        };

        let keep = self.strategy == ContextStrategy::Reuse && !self.closed.load(Ordering::Acquire);
        if keep {
            self.slots[pooled.slot].idle.lock().push(context);
        } else {
            if let Err(e) = context.dispose().await {
                warn!("Failed to dispose browser context: {:#}", e);
            }
            self.disposed.fetch_add(1, Ordering::Relaxed);
        }
        // Permits are returned when `pooled` drops here
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            in_use: self.capacity - self.pool_permits.available_permits(),
            idle_contexts: self.slots.iter().map(|s| s.idle.lock().len()).sum(),
            contexts_created: self.created.load(Ordering::Relaxed),
            contexts_disposed: self.disposed.load(Ordering::Relaxed),
        }
    }

    /// Disposes idle contexts and closes every browser
    ///
    /// Sessions still open keep working until released; their contexts are
    /// disposed instead of pooled.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);

        for (i, slot) in self.slots.iter().enumerate() {
            let idle: Vec<_> = std::mem::take(&mut *slot.idle.lock());
            for context in idle {
                if let Err(e) = context.dispose().await {
                    warn!("Failed to dispose context on browser {}: {:#}", i, e);
                }
                self.disposed.fetch_add(1, Ordering::Relaxed);
            }
            if let Err(e) = slot.instance.close().await {
                warn!("Failed to close browser {}: {:#}", i, e);
            }
        }

        info!("Browser pool shut down");
    }

    /// Takes a permit from the first slot with room, starting round-robin
    fn claim_slot(&self) -> Option<(usize, OwnedSemaphorePermit)> {
        let count = self.slots.len();
        let start = self.next_slot.fetch_add(1, Ordering::Relaxed);

        (0..count).map(|offset| (start + offset) % count).find_map(|slot| {
            self.slots[slot]
                .permits
                .clone()
                .try_acquire_owned()
                .ok()
                .map(|permit| (slot, permit))
        })
    }
}
