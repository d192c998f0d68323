use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Sink for coarse progress updates emitted by both acquisition stages.
pub trait ProgressReporter: Send + Sync {
    fn set_length(&self, length: u64);
    fn advance(&self, delta: u64);
    fn set_message(&self, message: String);
    fn finish(&self);
}

/// Terminal progress bar backed by `indicatif`.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(length: u64) -> Self {
        let bar = ProgressBar::new(length);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}",
        ) {
            bar.set_style(style);
        }
        Self { bar }
    }

    /// Bar that draws nothing; useful when stderr is not a terminal.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl ProgressReporter for BarProgress {
    fn set_length(&self, length: u64) {
        self.bar.set_length(length);
    }

    fn advance(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, message: String) {
        self.bar.set_message(message);
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

/// Reporter that only keeps counters; used by tests and headless callers.
#[derive(Debug, Default)]
pub struct SilentProgress {
    length: AtomicU64,
    position: AtomicU64,
    message: Mutex<String>,
}

impl SilentProgress {
    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    pub fn message(&self) -> String {
        self.message
            .lock()
            .map(|message| message.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for SilentProgress {
    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn advance(&self, delta: u64) {
        self.position.fetch_add(delta, Ordering::Relaxed);
    }

    fn set_message(&self, message: String) {
        if let Ok(mut slot) = self.message.lock() {
            *slot = message;
        }
    }

    fn finish(&self) {}
}
