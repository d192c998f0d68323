use super::backoff::{sleep_with_cancellation, BackoffState};
use crate::http::retry::{RetryContext, DETAIL_FETCH_RETRY};
use crate::http::{DetailSource, FailureClass, UpstreamError};
use crate::model::{DeadLetter, FetchFailure, FetchResult, WorkItem};
use crate::queue::{ResultCollection, SharedLog, WorkQueue};
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Queue entry: a work item plus the attempts spent on it so far, across all workers.
#[derive(Debug, Clone)]
pub(crate) struct PendingItem {
    pub(crate) item: WorkItem,
    pub(crate) attempts: u32,
    pub(crate) malformed: u32,
}

impl PendingItem {
    pub(crate) fn new(item: WorkItem) -> Self {
        Self {
            item,
            attempts: 0,
            malformed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) request_timeout: Duration,
    pub(crate) min_backoff: Duration,
    pub(crate) max_backoff: Duration,
    pub(crate) max_attempts: Option<usize>,
    pub(crate) max_malformed_attempts: usize,
}

impl RetryPolicy {
    fn should_dead_letter(&self, pending: &PendingItem) -> bool {
        let attempts_spent = self
            .max_attempts
            .is_some_and(|max| pending.attempts as usize >= max);
        let malformed_spent = pending.malformed as usize >= self.max_malformed_attempts;
        attempts_spent || malformed_spent
    }
}

/// State shared by every worker of one acquisition.
pub(crate) struct WorkerShared {
    pub(crate) queue: Arc<WorkQueue<PendingItem>>,
    pub(crate) results: ResultCollection,
    pub(crate) failures: SharedLog<FetchFailure>,
    pub(crate) dead_letters: SharedLog<DeadLetter>,
    pub(crate) telemetry: Arc<Telemetry>,
    pub(crate) policy: RetryPolicy,
}

enum Step {
    Continue(Duration),
    Cancelled,
}

/// One detail worker bound to a single shard.
pub(crate) struct ItemWorker {
    id: usize,
    shard: String,
    source: Arc<dyn DetailSource>,
    shared: Arc<WorkerShared>,
    backoff: BackoffState,
    shutdown: CancellationToken,
}

impl ItemWorker {
    pub(crate) fn new(
        id: usize,
        source: Arc<dyn DetailSource>,
        shared: Arc<WorkerShared>,
        shutdown: CancellationToken,
    ) -> Self {
        let backoff = BackoffState::new(shared.policy.min_backoff, shared.policy.max_backoff);
        Self {
            id,
            shard: source.shard_id().to_string(),
            source,
            shared,
            backoff,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) -> Result<()> {
        tracing::debug!(worker = self.id, shard = %self.shard, "detail worker started");

        loop {
            let pending = select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                pending = self.shared.queue.pop() => pending,
            };

            // Acknowledges the dequeue on every path, after any requeue below.
            let queue = Arc::clone(&self.shared.queue);
            let guard = queue.task_guard();
            let step = self.attempt(pending).await;
            drop(guard);

            match step {
                Step::Continue(delay) => {
                    if !sleep_with_cancellation(delay, &self.shutdown).await {
                        break;
                    }
                }
                Step::Cancelled => break,
            }
        }

        tracing::debug!(worker = self.id, shard = %self.shard, "detail worker stopped");
        Ok(())
    }

    async fn attempt(&mut self, mut pending: PendingItem) -> Step {
        let request_timeout = self.shared.policy.request_timeout;
        let outcome = select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            outcome = timeout(request_timeout, self.source.fetch_detail(&pending.item)) => Some(outcome),
        };

        let Some(outcome) = outcome else {
            tracing::debug!(
                worker = self.id,
                outpoint = %pending.item.id(),
                "cancelled with item in flight; requeueing"
            );
            self.shared.queue.push(pending);
            return Step::Cancelled;
        };

        pending.attempts += 1;
        let outcome = outcome.unwrap_or_else(|_| {
            Err(UpstreamError::Timeout {
                url: format!("{}/{}", self.shard, pending.item.txid()),
            }
            .into())
        });

        match outcome {
            Ok(record) => {
                self.record_success(pending, record);
                self.backoff.on_success();
                Step::Continue(self.backoff.delay())
            }
            Err(err) => {
                let backoff = self.backoff.on_failure();
                self.record_failure(pending, err, backoff);
                Step::Continue(backoff)
            }
        }
    }

    fn record_success(&self, pending: PendingItem, record: serde_json::Value) {
        let outpoint = pending.item.id();
        let kept = self.shared.results.insert(FetchResult {
            item: pending.item,
            record,
            worker: self.id,
            attempt: pending.attempts,
        });

        if kept {
            self.shared.telemetry.record_detail_success();
            tracing::trace!(
                worker = self.id,
                outpoint = %outpoint,
                attempt = pending.attempts,
                "transaction fetched"
            );
        } else {
            self.shared.telemetry.record_duplicate_result();
            tracing::warn!(
                worker = self.id,
                outpoint = %outpoint,
                "duplicate result discarded"
            );
        }
    }

    fn record_failure(&self, mut pending: PendingItem, err: anyhow::Error, backoff: Duration) {
        let telemetry = &self.shared.telemetry;
        let class = FailureClass::of(&err);
        let timed_out = FailureClass::is_timeout(&err);
        let attempt = pending.attempts;
        let outpoint = pending.item.id();
        let message = format!("{err:#}");

        telemetry.record_detail_failure();
        if timed_out {
            telemetry.record_timeout();
        }
        if class == FailureClass::Structural {
            pending.malformed += 1;
            telemetry.record_malformed();
        }

        let ctx = RetryContext::item(&DETAIL_FETCH_RETRY, self.id, &self.shard, outpoint);
        if self.shared.policy.should_dead_letter(&pending) {
            ctx.log_dead_letter(attempt, class, &err);
            telemetry.record_dead_letter();
            self.shared.dead_letters.append(DeadLetter {
                item: pending.item,
                attempts: attempt,
                class,
                last_error: message.clone(),
            });
        } else {
            if timed_out {
                ctx.log_timeout(attempt, backoff);
            } else {
                ctx.log_retry(attempt, backoff, class, &err);
            }
            telemetry.record_requeue();
            self.shared.queue.push(pending);
        }

        self.shared.failures.append(FetchFailure {
            item: outpoint,
            worker: self.id,
            shard: self.shard.clone(),
            attempt,
            class,
            message,
        });
    }
}
