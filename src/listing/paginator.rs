use crate::http::retry::{RetryContext, LISTING_PAGE_RETRY};
use crate::http::ListingSource;
use crate::listing::page::{ListingPage, PageRequest};
use crate::model::{total_value, Utxo};
use crate::runtime::error::AcquisitionError;
use crate::runtime::progress::{ProgressReporter, SilentProgress};
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::select;
use tokio_util::sync::CancellationToken;

/// Sequential pager over the unspent listing of one address.
///
/// A failed page is retried at the same offset with half the page size, without any delay.
/// The size never grows back within one fetch; a failure at size 1 ends the fetch.
pub struct PaginatedFetcher {
    source: Arc<dyn ListingSource>,
    initial_page_size: usize,
    progress: Arc<dyn ProgressReporter>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl PaginatedFetcher {
    pub fn new(source: Arc<dyn ListingSource>, initial_page_size: usize) -> Self {
        Self {
            source,
            initial_page_size: initial_page_size.max(1),
            progress: Arc::new(SilentProgress::default()),
            telemetry: Arc::new(Telemetry::default()),
            shutdown: CancellationToken::new(),
        }
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

    /// Lists up to `limit` unspents of `address` in the order the endpoint returns them.
    pub async fn fetch(&self, address: &str, limit: usize) -> Result<Vec<Utxo>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut request = PageRequest::new(self.initial_page_size, 0);
        let mut utxos: Vec<Utxo> = Vec::new();
        let mut attempt = 0u32;

        self.progress.set_length(limit as u64);
        self.progress
            .set_message(format!("listing unspents of {address}"));

        loop {
            attempt += 1;
            let outcome = select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return Err(AcquisitionError::Cancelled.into());
                }
                outcome = self.source.fetch_page(address, request) => outcome,
            };

            let (page, decoded) = match outcome.and_then(decode_page) {
                Ok(decoded) => decoded,
                Err(err) => {
                    let ctx = RetryContext::page(&LISTING_PAGE_RETRY, request.skip, request.limit);
                    if request.limit <= 1 {
                        ctx.log_exhausted(attempt, &err);
                        return Err(AcquisitionError::ListingExhausted {
                            address: address.to_string(),
                            skip: request.skip,
                            source: err,
                        }
                        .into());
                    }

                    let next = request.halved();
                    ctx.log_shrink(attempt, next.limit, &err);
                    self.telemetry.record_page_shrink();
                    request = next;
                    continue;
                }
            };

            attempt = 0;
            self.telemetry.record_listing_page(page.count);
            let is_last = page.is_last(request);

            tracing::debug!(
                address,
                skip = request.skip,
                page_size = request.limit,
                count = page.count,
                "listing page fetched"
            );

            let before = utxos.len();
            utxos.extend(decoded);
            request.skip = page.next_skip();

            let visible = utxos.len().min(limit) - before.min(limit);
            if visible > 0 {
                self.progress.advance(visible as u64);
            }
            self.progress.set_message(format!(
                "fetched {} unspents worth {}",
                utxos.len(),
                total_value(&utxos)
            ));

            if utxos.len() >= limit || is_last {
                break;
            }
        }

        utxos.truncate(limit);
        self.progress.finish();
        tracing::info!(
            address,
            fetched = utxos.len(),
            limit,
            "unspent listing complete"
        );
        Ok(utxos)
    }
}

fn decode_page(mut page: ListingPage) -> Result<(ListingPage, Vec<Utxo>)> {
    let utxos = std::mem::take(&mut page.unspents)
        .into_iter()
        .map(Utxo::try_from)
        .collect::<Result<Vec<_>>>()
        .context("listing page contained an invalid unspent")?;
    Ok((page, utxos))
}
