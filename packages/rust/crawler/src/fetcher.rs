//! Fetch capability and its two implementations.
//!
//! No structured error crosses the [`Fetcher`] boundary: a timeout, a non-2xx
//! status, a body read failure or an empty extraction all come back as an
//! empty string.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use hashstack_shared::{FetchConfig, FetchMode, HashstackError, Result};

use crate::extract::extract_primary_text;

/// Connect timeout used by the accelerated fetcher.
const ACCELERATED_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Retrieves one locator and reduces it to a single text span.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `locator`. An empty string is the only failure signal.
    async fn fetch(&self, locator: &Url) -> String;

    /// Human-readable implementation name for tracing.
    fn name(&self) -> &str;
}

/// Build the fetcher selected by `config.mode`.
pub fn build_fetcher(config: &FetchConfig) -> Result<Arc<dyn Fetcher>> {
    let fetcher: Arc<dyn Fetcher> = match config.mode {
        FetchMode::Baseline => Arc::new(HttpFetcher::new(config)?),
        FetchMode::Accelerated => Arc::new(AcceleratedFetcher::new(config)?),
    };
    debug!(fetcher = fetcher.name(), "fetcher selected");
    Ok(fetcher)
}

// ---------------------------------------------------------------------------
// Baseline
// ---------------------------------------------------------------------------

/// One GET per locator, bounded by the client's request timeout.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| HashstackError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, locator: &Url) -> String {
        match get_body(&self.client, locator).await {
            Ok(body) => extract_primary_text(&body),
            Err(e) => {
                debug!(%locator, error = %e, "fetch failed, dropping locator");
                String::new()
            }
        }
    }

    fn name(&self) -> &str {
        "baseline"
    }
}

// ---------------------------------------------------------------------------
// Accelerated
// ---------------------------------------------------------------------------

/// Hard wall-clock deadline over connect, headers and body together, plus a
/// short connect timeout so dead hosts give their slot back early.
pub struct AcceleratedFetcher {
    client: Client,
    deadline: Duration,
}

impl AcceleratedFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let deadline = Duration::from_secs(config.accelerated_timeout_secs);
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .connect_timeout(ACCELERATED_CONNECT_TIMEOUT.min(deadline))
            .timeout(deadline)
            .build()
            .map_err(|e| HashstackError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, deadline })
    }
}

#[async_trait]
impl Fetcher for AcceleratedFetcher {
    async fn fetch(&self, locator: &Url) -> String {
        match tokio::time::timeout(self.deadline, get_body(&self.client, locator)).await {
            Ok(Ok(body)) => extract_primary_text(&body),
            Ok(Err(e)) => {
                debug!(%locator, error = %e, "fetch failed, dropping locator");
                String::new()
            }
            Err(_) => {
                debug!(%locator, deadline_ms = self.deadline.as_millis(), "hard deadline hit, abandoning fetch");
                String::new()
            }
        }
    }

    fn name(&self) -> &str {
        "accelerated"
    }
}

// ---------------------------------------------------------------------------
// Shared request path
// ---------------------------------------------------------------------------

/// GET `url` and return the body of a 2xx response.
async fn get_body(client: &Client, url: &Url) -> Result<String> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| HashstackError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(HashstackError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| HashstackError::Network(format!("{url}: body read failed: {e}")))
}
