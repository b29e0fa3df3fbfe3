//! Subscription document retrieval
//!
//! GET the subscription URL, base64-decode the whole body, and parse each
//! non-empty line. Lines that fail to parse are logged and skipped; only the
//! HTTP exchange itself can fail the fetch.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SubvisorError};
use crate::models::Candidate;

use super::parser::{decode_base64, parse_candidate};

/// Source of candidates for a resolution cycle
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Candidate>>;
}

/// Fetches the subscription over plain HTTP
pub struct HttpSubscriptionFetcher {
    client: reqwest::Client,
    url: String,
}

impl HttpSubscriptionFetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| SubvisorError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SubscriptionSource for HttpSubscriptionFetcher {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Vec<Candidate>> {
        let start = Instant::now();
        debug!("Fetching subscription");

        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubvisorError::FetchFailed {
                status: Some(status.as_u16()),
                message: format!("bad http status: {}", status),
            });
        }

        let body = response.bytes().await?;
        let candidates = decode_subscription(&body).map_err(|e| SubvisorError::FetchFailed {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })?;

        info!(
            candidates = candidates.len(),
            bytes = body.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Subscription fetched"
        );

        Ok(candidates)
    }
}

/// Decode a base64 subscription body into candidates, skipping bad lines
pub fn decode_subscription(body: &[u8]) -> Result<Vec<Candidate>> {
    let raw = String::from_utf8_lossy(body);
    let decoded = decode_base64(&raw).map_err(|e| {
        SubvisorError::MalformedCandidate(format!("subscription body is not base64: {}", e))
    })?;
    let text = String::from_utf8_lossy(&decoded);

    let mut candidates = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_candidate(line) {
            Ok(candidate) => {
                debug!(candidate = %candidate, address = %candidate.address(), "Parsed candidate");
                candidates.push(candidate);
            }
            Err(e) => {
                warn!(line = %line, error = %e, "Skipping subscription line");
            }
        }
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve_router, unused_local_addr};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    fn ss_line(host: &str, port: u16) -> String {
        format!(
            "ss://{}#node",
            STANDARD.encode(format!("aes-256-gcm:pw@{}:{}", host, port))
        )
    }

    #[test]
    fn test_decode_subscription_skips_bad_lines() {
        let text = format!(
            "{}\r\n\nvmess://!!!\ntrojan://pw@host:443\n{}\n",
            ss_line("a.example.com", 8388),
            ss_line("b.example.com", 8389)
        );
        let body = STANDARD.encode(text);

        let candidates = decode_subscription(body.as_bytes()).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].address(), "a.example.com:8388");
        assert_eq!(candidates[1].address(), "b.example.com:8389");
    }

    #[test]
    fn test_decode_subscription_with_only_bad_lines_is_empty() {
        let body = STANDARD.encode("REMARKS=expired\nhttp://nothing");
        assert!(decode_subscription(body.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_decode_subscription_rejects_non_base64_body() {
        assert!(decode_subscription(b"<html>oops</html>").is_err());
    }

    #[tokio::test]
    async fn test_fetch_parses_candidates() {
        let body = STANDARD.encode(ss_line("c.example.com", 443));
        let addr = serve_router(Router::new().route("/sub", get(move || async move { body }))).await;

        let fetcher =
            HttpSubscriptionFetcher::new(format!("http://{}/sub", addr), Duration::from_secs(5))
                .unwrap();
        let candidates = fetcher.fetch().await.unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].display_name(), "ss://node");
    }

    #[tokio::test]
    async fn test_fetch_bad_status_is_fetch_failed() {
        let addr = serve_router(Router::new().route(
            "/sub",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        ))
        .await;

        let fetcher =
            HttpSubscriptionFetcher::new(format!("http://{}/sub", addr), Duration::from_secs(5))
                .unwrap();
        let err = fetcher.fetch().await.unwrap_err();

        assert!(matches!(
            err,
            SubvisorError::FetchFailed {
                status: Some(503),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_fetch_connection_refused_is_fetch_failed() {
        let addr = unused_local_addr().await;
        let fetcher =
            HttpSubscriptionFetcher::new(format!("http://{}/sub", addr), Duration::from_secs(2))
                .unwrap();

        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, SubvisorError::FetchFailed { status: None, .. }));
    }
}
