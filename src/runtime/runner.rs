use crate::http::{DetailClient, DetailSource, ListingClient, ListingSource};
use crate::listing::PaginatedFetcher;
use crate::model::{Utxo, WorkItem};
use crate::pool::{FetchReport, ItemFetcher};
use crate::runtime::config::AcquisitionConfig;
use crate::runtime::progress::{BarProgress, ProgressReporter, SilentProgress};
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use std::future::{self, Future};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Selected UTXOs together with their fetched parent transactions.
#[derive(Debug)]
pub struct Acquisition {
    pub utxos: Vec<Utxo>,
    pub report: FetchReport,
}

/// Wires the listing and detail stages under one root [`CancellationToken`].
pub struct Runner {
    config: AcquisitionConfig,
    listing: Arc<dyn ListingSource>,
    details: Vec<Arc<dyn DetailSource>>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    progress_bars: bool,
}

impl Runner {
    /// Builds HTTP clients for the configured listing endpoint and shards.
    pub fn new(config: AcquisitionConfig) -> Result<Self> {
        let listing: Arc<dyn ListingSource> = Arc::new(ListingClient::new(
            config.listing_url(),
            config.listing_http_options(),
        )?);
        let options = config.detail_http_options();
        let details = config
            .shards()
            .iter()
            .map(|shard| {
                DetailClient::new(shard.clone(), options.clone())
                    .map(|client| Arc::new(client) as Arc<dyn DetailSource>)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::with_sources(config, listing, details))
    }

    pub fn with_sources(
        config: AcquisitionConfig,
        listing: Arc<dyn ListingSource>,
        details: Vec<Arc<dyn DetailSource>>,
    ) -> Self {
        Self {
            config,
            listing,
            details,
            telemetry: Arc::new(Telemetry::default()),
            shutdown: CancellationToken::new(),
            progress_bars: false,
        }
    }

    /// Draws `indicatif` progress bars for both stages.
    pub fn with_progress_bars(mut self, enabled: bool) -> Self {
        self.progress_bars = enabled;
        self
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        Arc::clone(&self.telemetry)
    }

    /// Clone of the root shutdown token. The runner never replaces it, so cancelling it stops the
    /// acquisition in progress and makes every later one return `AcquisitionError::Cancelled`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Lists up to the configured `fetch_limit` unspents of `address`.
    pub async fn list_unspents(&self, address: &str) -> Result<Vec<Utxo>> {
        self.list_unspents_with_limit(address, self.config.fetch_limit())
            .await
    }

    pub async fn list_unspents_with_limit(&self, address: &str, limit: usize) -> Result<Vec<Utxo>> {
        self.list_with(address, limit, self.shutdown.child_token())
            .await
    }

    /// Fetches the parent transaction of every UTXO.
    pub async fn fetch_transactions(&self, utxos: Vec<Utxo>) -> Result<FetchReport> {
        self.fetch_with(utxos, self.shutdown.child_token()).await
    }

    /// Lists the unspents of `address`, lets `select` filter and order them, then fetches the
    /// parent transaction of every selected output.
    pub async fn acquire<F>(&self, address: &str, select: F) -> Result<Acquisition>
    where
        F: FnOnce(Vec<Utxo>) -> Vec<Utxo>,
    {
        self.acquire_with(address, select, self.shutdown.child_token())
            .await
    }

    /// Runs [`Runner::acquire`] until it finishes or `stop` resolves. A stopped run returns
    /// `AcquisitionError::Cancelled`; only that run is cancelled, the runner stays usable.
    pub async fn run_until<F, S>(&self, address: &str, select: F, stop: S) -> Result<Acquisition>
    where
        F: FnOnce(Vec<Utxo>) -> Vec<Utxo>,
        S: Future<Output = ()>,
    {
        let run = self.shutdown.child_token();
        let acquisition = self.acquire_with(address, select, run.clone());
        tokio::pin!(acquisition);

        tokio::select! {
            result = &mut acquisition => result,
            _ = stop => {
                tracing::info!(address, "stop requested; cancelling acquisition");
                run.cancel();
                acquisition.await
            }
        }
    }

    /// [`Runner::run_until`] with Ctrl-C (SIGINT) as the stop signal.
    pub async fn run_until_ctrl_c<F>(&self, address: &str, select: F) -> Result<Acquisition>
    where
        F: FnOnce(Vec<Utxo>) -> Vec<Utxo>,
    {
        let ctrl_c = async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::warn!(error = %err, "failed to listen for Ctrl-C");
                future::pending::<()>().await;
            }
        };
        self.run_until(address, select, ctrl_c).await
    }

    async fn acquire_with<F>(
        &self,
        address: &str,
        select: F,
        run: CancellationToken,
    ) -> Result<Acquisition>
    where
        F: FnOnce(Vec<Utxo>) -> Vec<Utxo>,
    {
        let listed = self
            .list_with(address, self.config.fetch_limit(), run.clone())
            .await?;
        let listed_count = listed.len();
        let utxos = select(listed);
        tracing::info!(
            address,
            listed = listed_count,
            selected = utxos.len(),
            "unspents selected for transaction fetch"
        );

        let report = self.fetch_with(utxos.clone(), run).await?;
        Ok(Acquisition { utxos, report })
    }

    async fn list_with(
        &self,
        address: &str,
        limit: usize,
        run: CancellationToken,
    ) -> Result<Vec<Utxo>> {
        PaginatedFetcher::new(Arc::clone(&self.listing), self.config.initial_page_size())
            .with_progress(self.progress(limit as u64))
            .with_telemetry(Arc::clone(&self.telemetry))
            .with_shutdown(run)
            .fetch(address, limit)
            .await
    }

    async fn fetch_with(&self, utxos: Vec<Utxo>, run: CancellationToken) -> Result<FetchReport> {
        let items: Vec<WorkItem> = utxos.into_iter().map(WorkItem::from).collect();
        ItemFetcher::with_sources(&self.config, self.details.clone())?
            .with_progress(self.progress(items.len() as u64))
            .with_telemetry(Arc::clone(&self.telemetry))
            .with_shutdown(run)
            .fetch_all(items)
            .await
    }

    fn progress(&self, length: u64) -> Arc<dyn ProgressReporter> {
        if self.progress_bars {
            Arc::new(BarProgress::new(length))
        } else {
            Arc::new(SilentProgress::default())
        }
    }
}
