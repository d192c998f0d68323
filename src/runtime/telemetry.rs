use crate::queue::WorkQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a fmt tracing subscriber unless one is already active.
///
/// Honours `RUST_LOG` when present and falls back to `info`. Safe to call repeatedly.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters for both acquisition stages.
#[derive(Default, Debug)]
pub struct Telemetry {
    listing_pages: AtomicU64,
    listed_items: AtomicU64,
    page_shrinks: AtomicU64,
    detail_successes: AtomicU64,
    detail_failures: AtomicU64,
    timeouts: AtomicU64,
    malformed: AtomicU64,
    requeues: AtomicU64,
    dead_letters: AtomicU64,
    duplicate_results: AtomicU64,
}

impl Telemetry {
    pub fn record_listing_page(&self, items: u64) {
        self.listing_pages.fetch_add(1, Ordering::Relaxed);
        self.listed_items.fetch_add(items, Ordering::Relaxed);
    }

    pub fn record_page_shrink(&self) {
        self.page_shrinks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detail_success(&self) {
        self.detail_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detail_failure(&self) {
        self.detail_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_requeue(&self) {
        self.requeues.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_letter(&self) {
        self.dead_letters.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_result(&self) {
        self.duplicate_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            listing_pages: self.listing_pages.load(Ordering::Relaxed),
            listed_items: self.listed_items.load(Ordering::Relaxed),
            page_shrinks: self.page_shrinks.load(Ordering::Relaxed),
            detail_successes: self.detail_successes.load(Ordering::Relaxed),
            detail_failures: self.detail_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            requeues: self.requeues.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
            duplicate_results: self.duplicate_results.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub listing_pages: u64,
    pub listed_items: u64,
    pub page_shrinks: u64,
    pub detail_successes: u64,
    pub detail_failures: u64,
    pub timeouts: u64,
    pub malformed: u64,
    pub requeues: u64,
    pub dead_letters: u64,
    pub duplicate_results: u64,
}

/// Spawns a task that periodically logs detail throughput, queue depth and failure counters.
pub fn spawn_metrics_reporter<T: Send + 'static>(
    telemetry: Arc<Telemetry>,
    queue: Arc<WorkQueue<T>>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(target: "utxofetch::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let fetched_delta = current
                        .detail_successes
                        .saturating_sub(last_snapshot.detail_successes);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        fetched_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "utxofetch::metrics",
                        throughput = format!("{throughput:.2}"),
                        fetched = current.detail_successes,
                        queue_depth = queue.len(),
                        unfinished = queue.unfinished(),
                        failures = current.detail_failures,
                        timeouts = current.timeouts,
                        malformed = current.malformed,
                        dead_letters = current.dead_letters,
                        "acquisition metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
