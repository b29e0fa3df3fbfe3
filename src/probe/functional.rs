//! End-to-end probing through the running engine
//!
//! Issues a GET to the probe URL via the engine's local HTTP inbound. Any
//! response, whatever its status, proves traffic flows through the engine.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::error::{Result, SubvisorError};

/// End-to-end connectivity check through the supervised engine
#[async_trait]
pub trait FunctionalCheck: Send + Sync {
    /// Try up to `retries` times; `Err(ProbeFailed)` carries the last error
    async fn probe(&self, retries: u32) -> Result<()>;
}

/// Functional prober backed by a proxied reqwest client
pub struct HttpFunctionalProber {
    client: reqwest::Client,
    probe_url: String,
    backoff: Duration,
}

impl HttpFunctionalProber {
    pub fn new(
        proxy_url: &str,
        probe_url: impl Into<String>,
        attempt_timeout: Duration,
        backoff: Duration,
    ) -> Result<Self> {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| SubvisorError::InvalidConfig(format!("invalid probe proxy: {}", e)))?;

        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(attempt_timeout)
            .build()
            .map_err(|e| SubvisorError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            probe_url: probe_url.into(),
            backoff,
        })
    }
}

#[async_trait]
impl FunctionalCheck for HttpFunctionalProber {
    #[instrument(skip(self), fields(url = %self.probe_url))]
    async fn probe(&self, retries: u32) -> Result<()> {
        let attempts = retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let start = Instant::now();

            match self.client.get(&self.probe_url).send().await {
                Ok(response) => {
                    info!(
                        attempt,
                        status = response.status().as_u16(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Functional probe succeeded"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Functional probe attempt failed");
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.backoff).await;
            }
        }

        Err(SubvisorError::ProbeFailed(format!(
            "{} attempt(s) failed, last error: {}",
            attempts, last_error
        )))
    }
}
