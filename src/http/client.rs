//! HTTP client plumbing shared by the listing and detail sources. Houses the
//! `HttpJsonClient`, the `UpstreamError` taxonomy, and the failure classifier
//! consumed by the retry loops.

use crate::http::options::HttpClientOptions;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::fmt;
use tokio::time::{timeout, Instant};

/// Failure of a single upstream request.
#[derive(Debug)]
pub enum UpstreamError {
    Timeout { url: String },
    Status { url: String, status: u16, body: String },
    Transport { url: String, message: String },
    Malformed { url: String, message: String },
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::Timeout { url } => write!(f, "request to {url} timed out"),
            UpstreamError::Status { url, status, body } => {
                if body.is_empty() {
                    write!(f, "request to {url} failed with HTTP {status}")
                } else {
                    write!(f, "request to {url} failed with HTTP {status}: {body}")
                }
            }
            UpstreamError::Transport { url, message } => {
                write!(f, "request to {url} failed: {message}")
            }
            UpstreamError::Malformed { url, message } => {
                write!(f, "response from {url} could not be decoded: {message}")
            }
        }
    }
}

impl std::error::Error for UpstreamError {}

/// Coarse retry class of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Non-2xx, timeout or transport failure; expected to succeed eventually.
    Transient,
    /// The upstream answered but the body is not what we expect.
    Structural,
}

impl FailureClass {
    pub fn of(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<UpstreamError>() {
            Some(UpstreamError::Malformed { .. }) => FailureClass::Structural,
            _ => FailureClass::Transient,
        }
    }

    pub fn is_timeout(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<UpstreamError>(),
            Some(UpstreamError::Timeout { .. })
        )
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Transient => f.write_str("transient"),
            FailureClass::Structural => f.write_str("structural"),
        }
    }
}

/// GET-and-decode client with a hard per-request deadline.
#[derive(Debug, Clone)]
pub struct HttpJsonClient {
    client: Client,
    options: HttpClientOptions,
}

impl HttpJsonClient {
    pub fn new(options: HttpClientOptions) -> Result<Self> {
        options.validate()?;

        let client = Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .user_agent(options.user_agent.as_str())
            .gzip(true)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            options,
        })
    }

    pub fn options(&self) -> &HttpClientOptions {
        &self.options
    }

    /// Issues a GET and decodes the JSON body into `T`.
    ///
    /// Every failure is reported as an [`UpstreamError`] wrapped in `anyhow::Error` so retry
    /// loops can classify it with [`FailureClass::of`].
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let start = Instant::now();
        let deadline = self.options.request_timeout;

        let response = match timeout(deadline, self.client.get(url).send()).await {
            Err(_) => return Err(timed_out(url)),
            Ok(Err(err)) => return Err(transport_failure(url, err)),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            let remaining = deadline.saturating_sub(start.elapsed());
            let body = match timeout(remaining, response.text()).await {
                Ok(Ok(body)) => preview(&body, self.options.error_body_preview_bytes),
                _ => String::new(),
            };
            tracing::debug!(url, status = status.as_u16(), "upstream returned non-success status");
            return Err(UpstreamError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let remaining = deadline.saturating_sub(start.elapsed());
        let bytes = match timeout(remaining, response.bytes()).await {
            Err(_) => return Err(timed_out(url)),
            Ok(Err(err)) => return Err(transport_failure(url, err)),
            Ok(Ok(bytes)) => bytes,
        };

        serde_json::from_slice::<T>(&bytes).map_err(|err| {
            anyhow::Error::from(UpstreamError::Malformed {
                url: url.to_string(),
                message: err.to_string(),
            })
        })
    }
}

fn timed_out(url: &str) -> anyhow::Error {
    UpstreamError::Timeout {
        url: url.to_string(),
    }
    .into()
}

fn transport_failure(url: &str, err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        return timed_out(url);
    }
    UpstreamError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
    .into()
}

fn preview(body: &str, max_chars: usize) -> String {
    body.trim().chars().take(max_chars).collect()
}
