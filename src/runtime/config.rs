use crate::http::options::{HttpClientOptions, DEFAULT_USER_AGENT};
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

pub const DEFAULT_LISTING_URL: &str = "https://www.bitgo.com/api/v1";
pub const DEFAULT_SHARD_COUNT: usize = 5;
pub const DEFAULT_FETCH_LIMIT: usize = 10;
pub const DEFAULT_INITIAL_PAGE_SIZE: usize = 5_000;
pub const DEFAULT_MAX_MALFORMED_ATTEMPTS: usize = 3;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_LISTING_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MIN_BACKOFF_MS: u64 = 500;
const DEFAULT_MAX_BACKOFF_MS: u64 = 4_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// One upstream host serving the transaction detail API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardEndpoint {
    id: String,
    base_url: String,
}

impl ShardEndpoint {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let shard = Self {
            id: trimmed_string(id.into()),
            base_url: trimmed_string(base_url.into()),
        };
        ensure_not_empty(&shard.id, "shard id")?;
        validate_url(&shard.base_url, "shard base_url")
            .with_context(|| format!("invalid shard '{}'", shard.id))?;
        Ok(shard)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// The five public Trezor blockbook hosts `btc1` through `btc5`.
pub fn default_shards() -> Vec<ShardEndpoint> {
    (1..=DEFAULT_SHARD_COUNT)
        .map(|index| ShardEndpoint {
            id: format!("btc{index}"),
            base_url: format!("https://btc{index}.trezor.io/api/tx-specific"),
        })
        .collect()
}

/// Runtime configuration for both acquisition stages.
///
/// All instances go through [`AcquisitionConfig::builder`] or [`AcquisitionConfig::new`]
/// so invariants hold before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    listing_url: String,
    shards: Vec<ShardEndpoint>,
    workers: usize,
    fetch_limit: usize,
    initial_page_size: usize,
    request_timeout: Duration,
    listing_timeout: Duration,
    min_backoff: Duration,
    max_backoff: Duration,
    poll_interval: Duration,
    max_attempts: Option<usize>,
    max_malformed_attempts: usize,
    metrics_interval: Duration,
    user_agent: String,
}

pub struct AcquisitionConfigParams {
    pub listing_url: String,
    pub shards: Vec<ShardEndpoint>,
    pub workers: usize,
    pub fetch_limit: usize,
    pub initial_page_size: usize,
    pub request_timeout: Duration,
    pub listing_timeout: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub poll_interval: Duration,
    pub max_attempts: Option<usize>,
    pub max_malformed_attempts: usize,
    pub metrics_interval: Duration,
    pub user_agent: String,
}

impl AcquisitionConfig {
    pub fn builder() -> AcquisitionConfigBuilder {
        AcquisitionConfigBuilder::default()
    }

    /// Constructs a configuration directly from concrete values, running validation.
    pub fn new(params: AcquisitionConfigParams) -> Result<Self> {
        let AcquisitionConfigParams {
            listing_url,
            shards,
            workers,
            fetch_limit,
            initial_page_size,
            request_timeout,
            listing_timeout,
            min_backoff,
            max_backoff,
            poll_interval,
            max_attempts,
            max_malformed_attempts,
            metrics_interval,
            user_agent,
        } = params;

        let config = Self {
            listing_url: trimmed_string(listing_url),
            shards,
            workers,
            fetch_limit,
            initial_page_size,
            request_timeout,
            listing_timeout,
            min_backoff,
            max_backoff,
            poll_interval,
            max_attempts,
            max_malformed_attempts,
            metrics_interval,
            user_agent: trimmed_string(user_agent),
        };

        config.validate()?;
        Ok(config)
    }

    /// Base URL of the listing API, without the `/address/...` suffix.
    pub fn listing_url(&self) -> &str {
        &self.listing_url
    }

    pub fn shards(&self) -> &[ShardEndpoint] {
        &self.shards
    }

    /// Number of detail workers; worker `i` uses shard `i % shards.len()`.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Default number of UTXOs requested from the listing.
    pub fn fetch_limit(&self) -> usize {
        self.fetch_limit
    }

    pub fn initial_page_size(&self) -> usize {
        self.initial_page_size
    }

    /// Deadline for a single detail request.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Deadline for a single listing page.
    pub fn listing_timeout(&self) -> Duration {
        self.listing_timeout
    }

    pub fn min_backoff(&self) -> Duration {
        self.min_backoff
    }

    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Failed attempts after which an item is dead-lettered; `None` retries forever.
    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    /// Malformed responses tolerated per item before it is dead-lettered.
    pub fn max_malformed_attempts(&self) -> usize {
        self.max_malformed_attempts
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn listing_http_options(&self) -> HttpClientOptions {
        HttpClientOptions::default()
            .with_request_timeout(self.listing_timeout)
            .with_user_agent(self.user_agent.clone())
    }

    pub fn detail_http_options(&self) -> HttpClientOptions {
        let mut options = HttpClientOptions::default()
            .with_request_timeout(self.request_timeout)
            .with_user_agent(self.user_agent.clone());
        options.connect_timeout = options.connect_timeout.min(self.request_timeout);
        options
    }

    pub fn validate(&self) -> Result<()> {
        validate_url(&self.listing_url, "listing_url")?;

        if self.shards.is_empty() {
            bail!("shards cannot be empty");
        }
        for shard in &self.shards {
            ensure_not_empty(shard.id(), "shard id")?;
            validate_url(shard.base_url(), "shard base_url")
                .with_context(|| format!("invalid shard '{}'", shard.id()))?;
        }

        if self.workers == 0 {
            bail!("workers must be greater than 0");
        }

        if self.initial_page_size == 0 {
            bail!("initial_page_size must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.listing_timeout.is_zero() {
            bail!("listing_timeout must be greater than 0");
        }

        if self.min_backoff.is_zero() {
            bail!("min_backoff must be greater than 0");
        }

        if self.min_backoff > self.max_backoff {
            bail!(
                "min_backoff ({:?}) must not exceed max_backoff ({:?})",
                self.min_backoff,
                self.max_backoff
            );
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.max_attempts == Some(0) {
            bail!("max_attempts must be greater than 0 when set");
        }

        if self.max_malformed_attempts == 0 {
            bail!("max_malformed_attempts must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        ensure_not_empty(&self.user_agent, "user_agent")?;

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct AcquisitionConfigBuilder {
    listing_url: Option<String>,
    shards: Option<Vec<ShardEndpoint>>,
    workers: Option<usize>,
    fetch_limit: Option<usize>,
    initial_page_size: Option<usize>,
    request_timeout: Option<Duration>,
    listing_timeout: Option<Duration>,
    min_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    poll_interval: Option<Duration>,
    max_attempts: Option<usize>,
    max_malformed_attempts: Option<usize>,
    metrics_interval: Option<Duration>,
    user_agent: Option<String>,
}

impl AcquisitionConfigBuilder {
    pub fn listing_url(mut self, url: impl Into<String>) -> Self {
        self.listing_url = Some(url.into());
        self
    }

    pub fn shards(mut self, shards: Vec<ShardEndpoint>) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Replaces the shard list with endpoints built from `(id, base_url)` pairs.
    pub fn shard_urls<I, S, U>(mut self, shards: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, U)>,
        S: Into<String>,
        U: Into<String>,
    {
        let shards = shards
            .into_iter()
            .map(|(id, url)| ShardEndpoint::new(id, url))
            .collect::<Result<Vec<_>>>()?;
        self.shards = Some(shards);
        Ok(self)
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn fetch_limit(mut self, limit: usize) -> Self {
        self.fetch_limit = Some(limit);
        self
    }

    pub fn initial_page_size(mut self, size: usize) -> Self {
        self.initial_page_size = Some(size);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn listing_timeout(mut self, timeout: Duration) -> Self {
        self.listing_timeout = Some(timeout);
        self
    }

    pub fn min_backoff(mut self, backoff: Duration) -> Self {
        self.min_backoff = Some(backoff);
        self
    }

    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn max_malformed_attempts(mut self, attempts: usize) -> Self {
        self.max_malformed_attempts = Some(attempts);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn build(self) -> Result<AcquisitionConfig> {
        let shards = self.shards.unwrap_or_else(default_shards);
        let workers = self.workers.unwrap_or(shards.len());

        let params = AcquisitionConfigParams {
            listing_url: self
                .listing_url
                .unwrap_or_else(|| DEFAULT_LISTING_URL.to_string()),
            shards,
            workers,
            fetch_limit: self.fetch_limit.unwrap_or(DEFAULT_FETCH_LIMIT),
            initial_page_size: self.initial_page_size.unwrap_or(DEFAULT_INITIAL_PAGE_SIZE),
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS)),
            listing_timeout: self
                .listing_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_LISTING_TIMEOUT_SECS)),
            min_backoff: self
                .min_backoff
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_MIN_BACKOFF_MS)),
            max_backoff: self
                .max_backoff
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_MAX_BACKOFF_MS)),
            poll_interval: self
                .poll_interval
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)),
            max_attempts: self.max_attempts,
            max_malformed_attempts: self
                .max_malformed_attempts
                .unwrap_or(DEFAULT_MAX_MALFORMED_ATTEMPTS),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        };

        AcquisitionConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str, field: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("{field} must start with http:// or https://");
    }
    Ok(())
}
