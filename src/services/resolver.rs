//! Resolution cycle
//!
//! fetch → reachability filter → for each reachable candidate in order:
//! build config → restart engine → functional probe. The first candidate
//! that passes stays active. A cycle that runs out of candidates relaunches
//! the last accepted one so a failed reload never leaves the host without a
//! working proxy.

use std::time::Instant;

use tracing::{error, info, instrument, warn};

use crate::engine::{ConfigBuilder, EngineControl, ProcessInfo};
use crate::error::{Result, SubvisorError};
use crate::models::{Candidate, EngineConfig};
use crate::probe::{FunctionalCheck, ReachabilityProber};
use crate::subscription::SubscriptionSource;

/// Outcome of a successful cycle
#[derive(Debug, Clone)]
pub struct Resolution {
    pub candidate: Candidate,
    pub process: ProcessInfo,
}

/// Runs resolution cycles against one supervised engine
pub struct Resolver {
    source: Box<dyn SubscriptionSource>,
    prober: ReachabilityProber,
    builder: ConfigBuilder,
    engine: Box<dyn EngineControl>,
    functional: Box<dyn FunctionalCheck>,
    probe_retries: u32,
    /// Candidate from the last successful cycle
    accepted: Option<Candidate>,
    /// Candidate the engine is currently configured with
    running: Option<Candidate>,
}

impl Resolver {
    pub fn new(
        source: Box<dyn SubscriptionSource>,
        prober: ReachabilityProber,
        builder: ConfigBuilder,
        engine: Box<dyn EngineControl>,
        functional: Box<dyn FunctionalCheck>,
        probe_retries: u32,
    ) -> Self {
        Self {
            source,
            prober,
            builder,
            engine,
            functional,
            probe_retries,
            accepted: None,
            running: None,
        }
    }

    /// Candidate accepted by the most recent successful cycle
    pub fn accepted(&self) -> Option<&Candidate> {
        self.accepted.as_ref()
    }

    pub fn current_process(&self) -> Option<ProcessInfo> {
        self.engine.current()
    }

    /// Run one full cycle
    #[instrument(skip(self))]
    pub async fn run_cycle(&mut self) -> Result<Resolution> {
        let start = Instant::now();

        if self.engine.reap_exited() {
            self.running = None;
        }

        let result = self.resolve().await;

        match &result {
            Ok(resolution) => info!(
                candidate = %resolution.candidate,
                pid = resolution.process.pid,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Resolution cycle succeeded"
            ),
            Err(e) => {
                warn!(
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Resolution cycle failed"
                );
                self.restore_accepted().await;
            }
        }

        result
    }

    /// Stop the engine for good
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.engine.stop().await {
            error!("Failed to stop engine during shutdown: {}", e);
        }
        self.running = None;
    }

    async fn resolve(&mut self) -> Result<Resolution> {
        let reachable = select_reachable(self.source.as_ref(), &self.prober).await?;

        for (idx, candidate) in reachable.iter().enumerate() {
            info!(
                candidate = %candidate,
                address = %candidate.address(),
                attempt = idx + 1,
                of = reachable.len(),
                "Trying candidate"
            );

            let process = self.launch(candidate).await?;

            match self.functional.probe(self.probe_retries).await {
                Ok(()) => {
                    info!(candidate = %candidate, pid = process.pid, "Candidate accepted");
                    self.accepted = Some(candidate.clone());
                    return Ok(Resolution {
                        candidate: candidate.clone(),
                        process,
                    });
                }
                Err(e) if e.is_cycle_fatal() => return Err(e),
                Err(e) => {
                    warn!(candidate = %candidate, error = %e, "Candidate rejected");
                }
            }
        }

        Err(SubvisorError::AllCandidatesFailed {
            tried: reachable.len(),
        })
    }

    async fn launch(&mut self, candidate: &Candidate) -> Result<ProcessInfo> {
        self.running = None;
        let process = self.engine.start(&self.builder.build(candidate)).await?;
        self.running = Some(candidate.clone());
        Ok(process)
    }

    /// Put the last accepted candidate back if the engine no longer runs it
    async fn restore_accepted(&mut self) {
        let Some(accepted) = self.accepted.clone() else {
            return;
        };
        if self.running.as_ref() == Some(&accepted) && self.engine.current().is_some() {
            return;
        }

        info!(candidate = %accepted, "Restoring previously accepted candidate");
        if let Err(e) = self.launch(&accepted).await {
            error!(candidate = %accepted, error = %e, "Failed to restore engine");
        }
    }
}

/// Fetch candidates and keep the reachable ones, failing on an empty result
pub async fn select_reachable(
    source: &dyn SubscriptionSource,
    prober: &ReachabilityProber,
) -> Result<Vec<Candidate>> {
    let candidates = source.fetch().await?;
    if candidates.is_empty() {
        return Err(SubvisorError::NoCandidates);
    }

    let reachable = prober.probe(&candidates).await;
    if reachable.is_empty() {
        return Err(SubvisorError::UnreachableAll {
            tried: candidates.len(),
        });
    }

    Ok(reachable)
}

/// Render the engine config for the first reachable candidate without
/// touching any engine process
pub async fn generate_config(
    source: &dyn SubscriptionSource,
    prober: &ReachabilityProber,
    builder: &ConfigBuilder,
) -> Result<(Candidate, EngineConfig)> {
    let reachable = select_reachable(source, prober).await?;
    let Some(candidate) = reachable.into_iter().next() else {
        return Err(SubvisorError::UnreachableAll { tried: 0 });
    };

    let config = builder.build(&candidate);
    Ok((candidate, config))
}
