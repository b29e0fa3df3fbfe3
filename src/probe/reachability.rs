//! Transport-level reachability probing
//!
//! Every candidate is dialed concurrently against one shared deadline. A
//! successful connect marks the candidate reachable and the socket is dropped
//! straight away. Attempts still pending when the deadline fires are abandoned.

use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use crate::models::Candidate;

/// How reachability results turn into the list of candidates to try
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Probe everything and keep subscription order
    #[default]
    Ordered,
    /// Return the first candidate to connect and cancel the rest
    FirstReachable,
}

impl SelectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionPolicy::Ordered => "ordered",
            SelectionPolicy::FirstReachable => "first",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ordered" | "all" => Some(SelectionPolicy::Ordered),
            "first" | "first_reachable" => Some(SelectionPolicy::FirstReachable),
            _ => None,
        }
    }
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Concurrent TCP dialer bounded by a shared deadline
#[derive(Debug, Clone)]
pub struct ReachabilityProber {
    timeout: Duration,
    policy: SelectionPolicy,
}

impl ReachabilityProber {
    pub fn new(timeout: Duration, policy: SelectionPolicy) -> Self {
        Self { timeout, policy }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn with_policy(&self, policy: SelectionPolicy) -> Self {
        Self {
            timeout: self.timeout,
            policy,
        }
    }

    /// Return the reachable subset of `candidates`
    #[instrument(skip(self, candidates), fields(candidates = candidates.len(), policy = %self.policy))]
    pub async fn probe(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        let deadline = Instant::now() + self.timeout;

        let mut attempts: FuturesUnordered<_> = candidates
            .iter()
            .enumerate()
            .map(|(idx, candidate)| async move { (idx, dial(candidate, deadline).await) })
            .collect();

        let mut reachable = vec![false; candidates.len()];

        while let Some((idx, ok)) = attempts.next().await {
            if !ok {
                continue;
            }
            if self.policy == SelectionPolicy::FirstReachable {
                info!(
                    winner = %candidates[idx],
                    total = candidates.len(),
                    "Reachability probe complete"
                );
                // Dropping the set cancels the attempts still in flight.
                return vec![candidates[idx].clone()];
            }
            reachable[idx] = true;
        }

        let selected: Vec<Candidate> = candidates
            .iter()
            .zip(reachable)
            .filter_map(|(candidate, ok)| ok.then(|| candidate.clone()))
            .collect();

        info!(
            reachable = selected.len(),
            total = candidates.len(),
            "Reachability probe complete"
        );

        selected
    }
}

async fn dial(candidate: &Candidate, deadline: Instant) -> bool {
    let address = candidate.address();
    let start = Instant::now();

    match timeout_at(deadline, TcpStream::connect(&address)).await {
        Ok(Ok(_stream)) => {
            info!(
                candidate = %candidate,
                address = %address,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Candidate reachable"
            );
            true
        }
        Ok(Err(e)) => {
            warn!(candidate = %candidate, address = %address, error = %e, "Dial failed");
            false
        }
        Err(_) => {
            debug!(candidate = %candidate, address = %address, "Dial abandoned at deadline");
            false
        }
    }
}
