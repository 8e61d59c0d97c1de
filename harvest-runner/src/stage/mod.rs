//! Pipeline stage loops
//!
//! Every stage is a `StageProcessor` driven by the same `StageRunner` loop:
//!
//! 1. pause while the output queue is under backpressure
//! 2. dequeue an adaptively sized batch from the input queue
//! 3. process the batch with bounded parallelism, one context per task
//! 4. push advanced contexts to the output queue and failed ones to the
//!    `failed` queue
//! 5. sleep for the adaptive delay
//!
//! A failing or panicking item only fails its own context. Items interrupted
//! by shutdown go back onto the input queue untouched. Contexts a push could
//! not deliver stay with the runner and are pushed again before the next
//! dequeue.

pub mod collection;
pub mod processing;
pub mod transformation;

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use harvest_core::domain::context::{PipelineContext, PipelineState, TransitionError};
use harvest_queue::{BackPressureManager, QueueClient, QueueConfig, StageSettings, queues};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::StageError;

pub use collection::CollectionStage;
pub use processing::ProcessingStage;
pub use transformation::TransformationStage;

/// One stage's unit of work
#[async_trait]
pub trait StageProcessor: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Queue this stage drains
    fn input(&self) -> QueueConfig<PipelineContext>;

    /// Queue advanced contexts go to; `None` for the last stage
    fn output(&self) -> Option<QueueConfig<PipelineContext>>;

    /// Does the work for one context and advances its state
    async fn process(
        &self,
        ctx: &mut PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<(), StageError>;
}

/// Result of one loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Output queue under backpressure, nothing dequeued
    Paused,
    /// Input queue was empty
    Idle,
    Processed {
        advanced: usize,
        failed: usize,
        requeued: usize,
    },
}

enum ItemOutcome {
    Advanced(PipelineContext),
    Failed(PipelineContext),
    Requeued(PipelineContext),
    Discarded,
}

type Delivery = (QueueConfig<PipelineContext>, Vec<PipelineContext>);

pub struct StageRunner<P> {
    processor: Arc<P>,
    queue: QueueClient,
    backpressure: Arc<BackPressureManager>,
    settings: StageSettings,
    /// Processed contexts whose push failed, by target queue
    undelivered: Mutex<Vec<Delivery>>,
}

impl<P: StageProcessor> StageRunner<P> {
    pub fn new(
        processor: Arc<P>,
        queue: QueueClient,
        backpressure: Arc<BackPressureManager>,
        settings: StageSettings,
    ) -> Self {
        Self {
            processor,
            queue,
            backpressure,
            settings,
            undelivered: Mutex::new(Vec::new()),
        }
    }

    /// Runs until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let name = self.processor.name();
        info!(
            "Starting {} stage (batch {}..={}, concurrency {}, interval {:?})",
            name,
            self.settings.min_batch_size,
            self.settings.max_batch_size,
            self.settings.concurrency,
            self.settings.delay_interval
        );

        while !cancel.is_cancelled() {
            let delay = match self.run_once(&cancel).await {
                Ok(IterationOutcome::Paused) => self.settings.delay_interval,
                Ok(IterationOutcome::Idle) => {
                    debug!("{} stage idle", name);
                    self.adaptive_delay().await
                }
                Ok(IterationOutcome::Processed {
                    advanced,
                    failed,
                    requeued,
                }) => {
                    info!(
                        "{} stage batch done: {} advanced, {} failed, {} requeued",
                        name, advanced, failed, requeued
                    );
                    self.adaptive_delay().await
                }
                Err(e) => {
                    error!("{} stage iteration failed: {}", name, e);
                    self.settings.delay_interval
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if let Err(e) = self.redeliver().await {
            error!(
                "{} stage stopped with {} undelivered context(s): {}",
                name,
                self.undelivered_count(),
                e
            );
            return;
        }
        info!("{} stage stopped", name);
    }

    /// One iteration of the stage loop
    pub async fn run_once(
        &self,
        cancel: &CancellationToken,
    ) -> harvest_queue::Result<IterationOutcome> {
        let input = self.processor.input();

        // Nothing new is taken while earlier work is still undelivered
        self.redeliver().await?;

        if let Some(output) = self.processor.output()
            && self.backpressure.should_apply_back_pressure(&output).await?
        {
            warn!(
                "{} stage paused: backpressure on '{}'",
                self.processor.name(),
                output.name()
            );
            return Ok(IterationOutcome::Paused);
        }

        let batch_size = self
            .backpressure
            .calculate_adaptive_batch_size(
                &input,
                self.settings.min_batch_size,
                self.settings.max_batch_size,
            )
            .await?;

        let batch = self.queue.dequeue_batch(&input, batch_size, cancel).await?;
        if batch.is_empty() {
            return Ok(IterationOutcome::Idle);
        }

        debug!(
            "{} stage took {} item(s) (batch size {})",
            self.processor.name(),
            batch.len(),
            batch_size
        );

        let started = Instant::now();
        let count = batch.len();
        let outcomes: Vec<ItemOutcome> = futures::stream::iter(batch)
            .map(|ctx| self.process_item(ctx, cancel))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut advanced = Vec::new();
        let mut failed = Vec::new();
        let mut requeued = Vec::new();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Advanced(ctx) => advanced.push(ctx),
                ItemOutcome::Failed(ctx) => failed.push(ctx),
                ItemOutcome::Requeued(ctx) => requeued.push(ctx),
                ItemOutcome::Discarded => {}
            }
        }

        let outcome = IterationOutcome::Processed {
            advanced: advanced.len(),
            failed: failed.len(),
            requeued: requeued.len(),
        };

        let mut deliveries = vec![(queues::failed(), failed), (input, requeued)];
        if let Some(output) = self.processor.output() {
            deliveries.insert(0, (output, advanced));
        }

        let mut first_error = None;
        for (queue, items) in deliveries {
            if let Err(e) = self.deliver(queue, items).await {
                first_error.get_or_insert(e);
            }
        }

        self.queue
            .monitor()
            .record_processing(input.name(), started.elapsed(), count);

        match first_error {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    /// Number of contexts waiting to be pushed again
    pub fn undelivered_count(&self) -> usize {
        self.undelivered.lock().iter().map(|(_, items)| items.len()).sum()
    }

    /// Pushes `items` to `queue`, keeping them for redelivery on failure
    async fn deliver(
        &self,
        queue: QueueConfig<PipelineContext>,
        items: Vec<PipelineContext>,
    ) -> harvest_queue::Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        match self.queue.enqueue_batch(&queue, &items).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(
                    "{} stage holding {} context(s) for '{}': {}",
                    self.processor.name(),
                    items.len(),
                    queue.name(),
                    e
                );
                self.undelivered.lock().push((queue, items));
                Err(e)
            }
        }
    }

    /// Retries every held push; anything still failing stays held
    async fn redeliver(&self) -> harvest_queue::Result<()> {
        let held = std::mem::take(&mut *self.undelivered.lock());
        if held.is_empty() {
            return Ok(());
        }

        let mut first_error = None;
        for (queue, items) in held {
            let count = items.len();
            match self.deliver(queue, items).await {
                Ok(()) => debug!(
                    "{} stage redelivered {} context(s) to '{}'",
                    self.processor.name(),
                    count,
                    queue.name()
                ),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn process_item(&self, mut ctx: PipelineContext, cancel: &CancellationToken) -> ItemOutcome {
        let name = self.processor.name();

        if ctx.is_terminal() {
            warn!(
                "{} stage dropping context {} already in terminal state {}",
                name, ctx.id, ctx.state
            );
            return ItemOutcome::Discarded;
        }

        let result = AssertUnwindSafe(self.processor.process(&mut ctx, cancel))
            .catch_unwind()
            .await;

        let error = match result {
            Ok(Ok(())) => return ItemOutcome::Advanced(ctx),
            Ok(Err(e)) if e.is_cancelled() => {
                debug!("{} stage requeueing context {} on shutdown", name, ctx.id);
                return ItemOutcome::Requeued(ctx);
            }
            Ok(Err(e)) => e,
            Err(panic) => StageError::Panicked(panic_message(panic.as_ref())),
        };

        warn!(
            "{} stage failed context {} ({}): {}",
            name, ctx.id, ctx.metadata.collection_url, error
        );
        if ctx.fail(error.to_string()) {
            ItemOutcome::Failed(ctx)
        } else {
            ItemOutcome::Discarded
        }
    }

    async fn adaptive_delay(&self) -> Duration {
        let input = self.processor.input();
        match self
            .backpressure
            .calculate_adaptive_delay(&input, self.settings.delay_interval)
            .await
        {
            Ok(delay) => delay,
            Err(e) => {
                warn!("Falling back to base delay for '{}': {}", input.name(), e);
                self.settings.delay_interval
            }
        }
    }
}

/// Rejects a context that is not in the state this stage consumes
pub(crate) fn expect_state(
    ctx: &PipelineContext,
    expected: PipelineState,
    to: PipelineState,
) -> Result<(), StageError> {
    if ctx.state != expected {
        return Err(TransitionError::Illegal {
            from: ctx.state,
            to,
        }
        .into());
    }
    Ok(())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use harvest_queue::{
        BackPressureConfig, MemoryQueueStore, QueueError, QueueHealthMonitor, QueueSettings,
        QueueStore,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use uuid::Uuid;

    pub struct Harness {
        pub queue: QueueClient,
        pub backpressure: Arc<BackPressureManager>,
    }

    pub fn harness(config: BackPressureConfig) -> Harness {
        harness_with_store(Arc::new(MemoryQueueStore::new()), config)
    }

    pub fn harness_with_store(store: Arc<dyn QueueStore>, config: BackPressureConfig) -> Harness {
        let monitor = Arc::new(QueueHealthMonitor::new(
            store.clone(),
            config.queue_thresholds.clone(),
        ));
        let settings = QueueSettings {
            batch_dequeue_max_wait: Duration::from_millis(50),
            batch_dequeue_delay_interval: Duration::from_millis(10),
            ..Default::default()
        };
        Harness {
            queue: QueueClient::new(store, settings, monitor.clone()),
            backpressure: Arc::new(BackPressureManager::new(monitor, config)),
        }
    }

    pub fn settings(min: usize, max: usize, concurrency: usize) -> StageSettings {
        StageSettings {
            delay_interval: Duration::from_millis(10),
            min_batch_size: min,
            max_batch_size: max,
            concurrency,
        }
    }

    pub fn pending(url: &str, sku: &str) -> PipelineContext {
        PipelineContext::new(Uuid::new_v4(), "test", sku, url)
    }

    pub async fn drain(h: &Harness, queue: QueueConfig<PipelineContext>) -> Vec<PipelineContext> {
        h.queue
            .dequeue_batch(&queue, 1000, &CancellationToken::new())
            .await
            .unwrap()
    }

    /// Collects anything whose URL does not mention "boom"; panics otherwise
    #[derive(Default)]
    struct EchoProcessor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StageProcessor for EchoProcessor {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn input(&self) -> QueueConfig<PipelineContext> {
            queues::collection()
        }

        fn output(&self) -> Option<QueueConfig<PipelineContext>> {
            Some(queues::transformation())
        }

        async fn process(
            &self,
            ctx: &mut PipelineContext,
            cancel: &CancellationToken,
        ) -> Result<(), StageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let url = ctx.metadata.collection_url.clone();
            if url.contains("boom") {
                panic!("collector exploded on {}", url);
            }
            if url.contains("slow") && cancel.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            if url.contains("bad") {
                return Err(StageError::Collection(anyhow::anyhow!("404 for {}", url)));
            }
            ctx.mark_collected(format!("<html>{}</html>", url))?;
            Ok(())
        }
    }

    fn runner(h: &Harness, settings: StageSettings) -> (StageRunner<EchoProcessor>, Arc<EchoProcessor>) {
        let processor = Arc::new(EchoProcessor::default());
        (
            StageRunner::new(
                processor.clone(),
                h.queue.clone(),
                h.backpressure.clone(),
                settings,
            ),
            processor,
        )
    }

    async fn seed(h: &Harness, urls: &[&str]) {
        let items: Vec<_> = urls.iter().map(|u| pending(u, "echo")).collect();
        h.queue.enqueue_batch(&queues::collection(), &items).await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_size_follows_input_depth() {
        // 60 queued against critical 90 => 10 - 9 * 2/3 = 4
        let h = harness(BackPressureConfig::default().with_thresholds("collection", 45, 90));
        let urls: Vec<String> = (0..60).map(|i| format!("https://x/{}", i)).collect();
        let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        seed(&h, &refs).await;

        let (runner, processor) = runner(&h, settings(1, 10, 4));
        let outcome = runner.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(
            outcome,
            IterationOutcome::Processed {
                advanced: 4,
                failed: 0,
                requeued: 0
            }
        );
        assert_eq!(processor.calls.load(Ordering::SeqCst), 4);
        assert_eq!(h.queue.length(&queues::collection()).await.unwrap(), 56);
        assert_eq!(h.queue.length(&queues::transformation()).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_item() {
        let h = harness(BackPressureConfig::default());
        seed(&h, &["https://x/1", "https://x/bad", "https://x/boom", "https://x/2"]).await;

        let (runner, _) = runner(&h, settings(1, 10, 2));
        let outcome = runner.run_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            outcome,
            IterationOutcome::Processed {
                advanced: 2,
                failed: 2,
                requeued: 0
            }
        );

        let advanced = drain(&h, queues::transformation()).await;
        assert!(advanced.iter().all(|c| c.state == PipelineState::Collected));

        let failed = drain(&h, queues::failed()).await;
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|c| c.state == PipelineState::Failed));
        let panicked = failed
            .iter()
            .find(|c| c.metadata.collection_url.contains("boom"))
            .unwrap();
        assert!(
            panicked
                .error_message
                .as_deref()
                .unwrap()
                .contains("collector exploded")
        );
    }

    #[tokio::test]
    async fn test_pauses_under_downstream_backpressure() {
        let h = harness(BackPressureConfig::default().with_thresholds("transformation", 1, 2));
        seed(&h, &["https://x/1"]).await;
        let downstream: Vec<_> = (0..2).map(|i| pending(&format!("https://y/{}", i), "echo")).collect();
        h.queue
            .enqueue_batch(&queues::transformation(), &downstream)
            .await
            .unwrap();

        let (runner, processor) = runner(&h, settings(1, 10, 1));
        let outcome = runner.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, IterationOutcome::Paused);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.queue.length(&queues::collection()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_idle_when_input_empty() {
        let h = harness(BackPressureConfig::default());
        let (runner, _) = runner(&h, settings(1, 10, 1));
        assert_eq!(
            runner.run_once(&CancellationToken::new()).await.unwrap(),
            IterationOutcome::Idle
        );
    }

    #[tokio::test]
    async fn test_terminal_contexts_are_dropped() {
        let h = harness(BackPressureConfig::default());
        let mut failed = pending("https://x/1", "echo");
        failed.fail("earlier failure");
        h.queue.enqueue(&queues::collection(), &failed).await.unwrap();

        let (runner, processor) = runner(&h, settings(1, 10, 1));
        runner.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.queue.length(&queues::failed()).await.unwrap(), 0);
        assert_eq!(h.queue.length(&queues::transformation()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_items_go_back_to_input() {
        let h = harness(BackPressureConfig::default());
        seed(&h, &["https://x/slow"]).await;
        let (runner, _) = runner(&h, settings(1, 10, 1));

        // Items already in the store are still popped on the first poll
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = runner.run_once(&cancel).await.unwrap();
        assert_eq!(
            outcome,
            IterationOutcome::Processed {
                advanced: 0,
                failed: 0,
                requeued: 1
            }
        );
        let back = drain(&h, queues::collection()).await;
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].state, PipelineState::Pending);
    }

    /// Memory store that rejects pushes to one queue while `down` is set
    struct PartitionedStore {
        inner: MemoryQueueStore,
        unreachable: &'static str,
        down: AtomicBool,
    }

    #[async_trait]
    impl QueueStore for PartitionedStore {
        async fn push(&self, queue: &str, items: Vec<String>) -> harvest_queue::Result<()> {
            if queue == self.unreachable && self.down.load(Ordering::SeqCst) {
                return Err(QueueError::unavailable("connection refused"));
            }
            self.inner.push(queue, items).await
        }

        async fn pop(&self, queue: &str, max: usize) -> harvest_queue::Result<Vec<String>> {
            self.inner.pop(queue, max).await
        }

        async fn len(&self, queue: &str) -> harvest_queue::Result<u64> {
            self.inner.len(queue).await
        }

        async fn clear(&self, queue: &str) -> harvest_queue::Result<()> {
            self.inner.clear(queue).await
        }
    }

    #[tokio::test]
    async fn test_failed_push_holds_contexts_until_store_recovers() {
        let store = Arc::new(PartitionedStore {
            inner: MemoryQueueStore::new(),
            unreachable: "transformation",
            down: AtomicBool::new(true),
        });
        let h = harness_with_store(store.clone(), BackPressureConfig::default());
        seed(&h, &["https://x/1", "https://x/bad", "https://x/2"]).await;

        let (runner, processor) = runner(&h, settings(1, 10, 2));
        let result = runner.run_once(&CancellationToken::new()).await;

        assert!(matches!(result, Err(QueueError::Unavailable(_))));
        assert_eq!(runner.undelivered_count(), 2);
        assert_eq!(h.queue.length(&queues::collection()).await.unwrap(), 0);
        assert_eq!(h.queue.length(&queues::failed()).await.unwrap(), 1);

        // Still down: held work is retried, nothing new is dequeued
        seed(&h, &["https://x/3"]).await;
        assert!(runner.run_once(&CancellationToken::new()).await.is_err());
        assert_eq!(runner.undelivered_count(), 2);
        assert_eq!(h.queue.length(&queues::collection()).await.unwrap(), 1);
        assert_eq!(processor.calls.load(Ordering::SeqCst), 3);

        store.down.store(false, Ordering::SeqCst);
        runner.run_once(&CancellationToken::new()).await.unwrap();

        assert_eq!(runner.undelivered_count(), 0);
        let advanced = drain(&h, queues::transformation()).await;
        assert_eq!(advanced.len(), 3);
        assert!(advanced.iter().all(|c| c.state == PipelineState::Collected));
    }

    #[tokio::test]
    async fn test_run_exits_on_cancel() {
        let h = harness(BackPressureConfig::default());
        let (runner, _) = runner(&h, settings(1, 10, 1));
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { runner.run(cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("stage loop did not stop")
            .unwrap();
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("plain");
        assert_eq!(panic_message(boxed.as_ref()), "plain");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
