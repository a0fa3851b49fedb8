//! Request dispatch: executes descriptors as HTTP GETs.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::descriptor::RequestDescriptor;

/// Result of a single dispatched request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub status: u16,
    pub bytes: usize,
    pub elapsed: Duration,
    pub cache_hit: bool,
    pub error: Option<String>,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }

    /// Outcome for a request that never produced a response.
    pub fn failed(elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            status: 0,
            bytes: 0,
            elapsed,
            cache_hit: false,
            error: Some(error.into()),
        }
    }
}

/// Executes request descriptors.
///
/// Transport failures are reported in the outcome, never as panics.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn fetch(&self, request: &RequestDescriptor) -> FetchOutcome;
}

/// HTTP dispatcher backed by a pooled reqwest client.
pub struct HttpDispatcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDispatcher {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        pool_size: usize,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(pool_size)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Dispatch for HttpDispatcher {
    async fn fetch(&self, request: &RequestDescriptor) -> FetchOutcome {
        let start = Instant::now();

        let url = match request.url(&self.base_url) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::failed(start.elapsed(), format!("invalid URL: {e}")),
        };

        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();

                // Check for cache hit from X-Cache header
                let cache_hit = response
                    .headers()
                    .get("x-cache")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.to_uppercase().contains("HIT"))
                    .unwrap_or(false);

                match response.bytes().await {
                    Ok(body) => FetchOutcome {
                        status,
                        bytes: body.len(),
                        elapsed: start.elapsed(),
                        cache_hit,
                        error: None,
                    },
                    Err(e) => FetchOutcome {
                        status,
                        bytes: 0,
                        elapsed: start.elapsed(),
                        cache_hit,
                        error: Some(e.to_string()),
                    },
                }
            }
            Err(e) => FetchOutcome::failed(start.elapsed(), e.to_string()),
        }
    }
}
