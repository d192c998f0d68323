use super::lifecycle::LifecycleHandles;
use super::worker::{PendingItem, RetryPolicy, WorkerShared};
use super::worker_pool::WorkerPool;
use crate::http::{DetailClient, DetailSource};
use crate::model::{FetchFailure, FetchResult, WorkItem};
use crate::queue::{ResultCollection, SharedLog, WorkQueue};
use crate::runtime::config::AcquisitionConfig;
use crate::runtime::error::AcquisitionError;
use crate::runtime::progress::{ProgressReporter, SilentProgress};
use crate::runtime::telemetry::Telemetry;
use anyhow::{bail, Result};
use bitcoin::OutPoint;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Outcome of a completed [`ItemFetcher::fetch_all`].
#[derive(Debug, Default)]
pub struct FetchReport {
    /// One entry per distinct work item, in completion order.
    pub results: Vec<FetchResult>,
    /// Every failed attempt, including the ones that were later retried successfully.
    pub failures: Vec<FetchFailure>,
    /// Results discarded because the same outpoint was already fetched.
    pub duplicates: usize,
}

/// Fetches the parent transaction of every work item through a pool of shard-bound workers.
///
/// Items are pulled from one shared queue. A failed attempt goes back onto the queue, so any
/// worker may retry it, and the failing worker backs off before pulling again. Completion is
/// decided by the queue's join barrier rather than by the approximate queue length used for
/// progress reporting.
pub struct ItemFetcher {
    sources: Vec<Arc<dyn DetailSource>>,
    workers: usize,
    policy: RetryPolicy,
    poll_interval: Duration,
    metrics_interval: Duration,
    progress: Arc<dyn ProgressReporter>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl ItemFetcher {
    /// Builds an HTTP detail client for every configured shard.
    pub fn new(config: &AcquisitionConfig) -> Result<Self> {
        let options = config.detail_http_options();
        let sources = config
            .shards()
            .iter()
            .map(|shard| {
                DetailClient::new(shard.clone(), options.clone())
                    .map(|client| Arc::new(client) as Arc<dyn DetailSource>)
            })
            .collect::<Result<Vec<_>>>()?;
        Self::with_sources(config, sources)
    }

    /// Uses caller-provided sources instead of the configured shards.
    pub fn with_sources(
        config: &AcquisitionConfig,
        sources: Vec<Arc<dyn DetailSource>>,
    ) -> Result<Self> {
        if sources.is_empty() {
            bail!("at least one detail source is required");
        }

        Ok(Self {
            sources,
            workers: config.workers(),
            policy: RetryPolicy {
                request_timeout: config.request_timeout(),
                min_backoff: config.min_backoff(),
                max_backoff: config.max_backoff(),
                max_attempts: config.max_attempts(),
                max_malformed_attempts: config.max_malformed_attempts(),
            },
            poll_interval: config.poll_interval(),
            metrics_interval: config.metrics_interval(),
            progress: Arc::new(SilentProgress::default()),
            telemetry: Arc::new(Telemetry::default()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    pub async fn fetch_all(&self, items: Vec<WorkItem>) -> Result<FetchReport> {
        if items.is_empty() {
            return Ok(FetchReport::default());
        }

        let expected: HashSet<OutPoint> = items.iter().map(WorkItem::id).collect();
        let total = items.len();
        let queue = Arc::new(WorkQueue::with_items(
            items.into_iter().map(PendingItem::new),
        ));
        let shared = Arc::new(WorkerShared {
            queue: Arc::clone(&queue),
            results: ResultCollection::new(),
            failures: SharedLog::new(),
            dead_letters: SharedLog::new(),
            telemetry: Arc::clone(&self.telemetry),
            policy: self.policy,
        });

        let lifecycle = LifecycleHandles::spawn(
            &self.shutdown,
            Arc::clone(&self.telemetry),
            Arc::clone(&queue),
            self.metrics_interval,
        );
        let pool = WorkerPool::launch(
            self.workers,
            &self.sources,
            Arc::clone(&shared),
            lifecycle.run_token.clone(),
            lifecycle.fatal_handler(),
        );

        tracing::info!(
            items = total,
            distinct = expected.len(),
            workers = pool.len(),
            shards = self.sources.len(),
            "fetching parent transactions"
        );

        self.progress.set_length(total as u64);
        let coordinated = self.coordinate(&shared, &lifecycle.run_token).await;

        // Workers exit once the run token fires; anything still queued is dropped with the queue.
        lifecycle.run_token.cancel();
        pool.join().await;
        let fatal = lifecycle.error();
        lifecycle.shutdown().await;
        self.progress.finish();

        if let Some(err) = fatal {
            return Err(err);
        }
        coordinated?;

        let results = shared.results.take();
        let dead_letters = shared.dead_letters.take();
        let failures = shared.failures.take();
        let duplicates = shared.results.duplicates();

        let covered: HashSet<OutPoint> = results
            .iter()
            .map(|result| result.item.id())
            .chain(dead_letters.iter().map(|dead| dead.item.id()))
            .collect();
        if covered != expected {
            return Err(AcquisitionError::Incomplete {
                expected: expected.len(),
                completed: results.len(),
                dead_lettered: dead_letters.len(),
            }
            .into());
        }

        if !dead_letters.is_empty() {
            tracing::error!(
                dead_letters = dead_letters.len(),
                fetched = results.len(),
                "some transactions could not be fetched"
            );
            return Err(AcquisitionError::DeadLettered { dead_letters }.into());
        }

        tracing::info!(
            fetched = results.len(),
            failed_attempts = failures.len(),
            duplicates,
            "parent transactions fetched"
        );

        Ok(FetchReport {
            results,
            failures,
            duplicates,
        })
    }

    async fn coordinate(&self, shared: &WorkerShared, run_token: &CancellationToken) -> Result<()> {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reported = ReportedProgress::default();

        loop {
            select! {
                biased;
                _ = run_token.cancelled() => return Err(AcquisitionError::Cancelled.into()),
                _ = ticker.tick() => {}
            }

            reported.refresh(shared, self.progress.as_ref());
            if shared.queue.is_empty() {
                break;
            }
        }

        select! {
            biased;
            _ = run_token.cancelled() => return Err(AcquisitionError::Cancelled.into()),
            _ = shared.queue.join() => {}
        }

        reported.refresh(shared, self.progress.as_ref());
        Ok(())
    }
}

#[derive(Default)]
struct ReportedProgress {
    done: usize,
    errors: usize,
}

impl ReportedProgress {
    fn refresh(&mut self, shared: &WorkerShared, progress: &dyn ProgressReporter) {
        let done = shared.results.len() + shared.dead_letters.len();
        let errors = shared.failures.len();
        if done == self.done && errors == self.errors {
            return;
        }

        if done > self.done {
            progress.advance((done - self.done) as u64);
        }
        self.done = done;
        self.errors = errors;
        progress.set_message(format!(
            "fetched {} transactions, {} failed attempts, {} queued",
            shared.results.len(),
            errors,
            shared.queue.len()
        ));
    }
}
