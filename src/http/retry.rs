//! Retry context and canned log templates shared by the listing pager and the
//! detail workers, so both stages report shrinks, requeues and exhaustion the
//! same way.

use crate::http::client::FailureClass;
use anyhow::Error;
use bitcoin::OutPoint;
use std::time::Duration;

macro_rules! log_with_retry_ctx {
    ($level:ident, $ctx:expr, $($rest:tt)*) => {{
        match $ctx.target {
            $crate::http::retry::RetryTarget::Page { skip, page_size } => {
                tracing::$level!(skip, page_size, $($rest)*);
            }
            $crate::http::retry::RetryTarget::Item { worker, shard, outpoint } => {
                tracing::$level!(worker, shard, outpoint = %outpoint, $($rest)*);
            }
        }
    }};
}

#[derive(Clone, Copy)]
pub(crate) enum RetryTarget<'a> {
    Page {
        skip: u64,
        page_size: usize,
    },
    Item {
        worker: usize,
        shard: &'a str,
        outpoint: OutPoint,
    },
}

/// Log labels for one retrying operation. A `None` label means the operation never
/// reaches that outcome and the matching `log_*` call is a no-op.
#[derive(Clone, Copy)]
pub(crate) struct RetryMessages {
    pub(crate) timeout: Option<&'static str>,
    pub(crate) retry: Option<&'static str>,
    pub(crate) exhausted: Option<&'static str>,
    pub(crate) shrink: Option<&'static str>,
    pub(crate) dead_letter: Option<&'static str>,
}

#[derive(Clone, Copy)]
pub(crate) struct RetryContext<'a> {
    target: RetryTarget<'a>,
    messages: &'a RetryMessages,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn page(messages: &'a RetryMessages, skip: u64, page_size: usize) -> Self {
        Self {
            target: RetryTarget::Page { skip, page_size },
            messages,
        }
    }

    pub(crate) fn item(
        messages: &'a RetryMessages,
        worker: usize,
        shard: &'a str,
        outpoint: OutPoint,
    ) -> Self {
        Self {
            target: RetryTarget::Item {
                worker,
                shard,
                outpoint,
            },
            messages,
        }
    }

    pub(crate) fn log_timeout(&self, attempt: u32, backoff: Duration) {
        if let Some(message) = self.messages.timeout {
            log_with_retry_ctx!(
                warn,
                self,
                attempt,
                backoff_ms = duration_to_millis(backoff),
                "{}",
                message
            );
        }
    }

    pub(crate) fn log_retry(&self, attempt: u32, backoff: Duration, class: FailureClass, err: &Error) {
        if let Some(message) = self.messages.retry {
            log_with_retry_ctx!(
                warn,
                self,
                attempt,
                backoff_ms = duration_to_millis(backoff),
                class = %class,
                error = %err,
                "{}",
                message
            );
        }
    }

    pub(crate) fn log_shrink(&self, attempt: u32, next_page_size: usize, err: &Error) {
        if let Some(message) = self.messages.shrink {
            log_with_retry_ctx!(
                warn,
                self,
                attempt,
                next_page_size,
                error = %err,
                "{}",
                message
            );
        }
    }

    pub(crate) fn log_dead_letter(&self, attempt: u32, class: FailureClass, err: &Error) {
        if let Some(message) = self.messages.dead_letter {
            log_with_retry_ctx!(error, self, attempt, class = %class, error = %err, "{}", message);
        }
    }

    pub(crate) fn log_exhausted(&self, attempt: u32, err: &Error) {
        if let Some(message) = self.messages.exhausted {
            log_with_retry_ctx!(error, self, attempt, error = %err, "{}", message);
        }
    }
}

pub(crate) fn duration_to_millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Listing pages never retry at the same size: every failure either shrinks the page or exhausts.
pub(crate) const LISTING_PAGE_RETRY: RetryMessages = RetryMessages {
    timeout: None,
    retry: None,
    exhausted: Some("listing page failed at page size 1; giving up"),
    shrink: Some("listing page failed; halving page size"),
    dead_letter: None,
};

/// Detail fetches requeue or dead-letter; they never exhaust the whole run.
pub(crate) const DETAIL_FETCH_RETRY: RetryMessages = RetryMessages {
    timeout: Some("transaction fetch timed out; requeueing"),
    retry: Some("transaction fetch failed; requeueing"),
    exhausted: None,
    shrink: None,
    dead_letter: Some("transaction fetch exceeded retry cap; dead-lettering item"),
};
