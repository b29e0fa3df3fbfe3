//! Reload scheduler
//!
//! Runs a resolution cycle immediately, then on every tick of a fixed timer.
//! Forced cycles from the admin API arrive over a channel and run on the same
//! task, so two cycles never overlap. A failed cycle is logged and the timer
//! keeps going, unless no cycle has ever succeeded: then there is no working
//! engine to keep alive and the scheduler returns the error.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::error::{Result, SubvisorError};
use crate::models::{CycleReport, SupervisorStatus};

use super::resolver::{Resolution, Resolver};

/// Forced cycle request; the reply carries the cycle's outcome
pub struct ReloadRequest {
    reply: oneshot::Sender<Result<Resolution>>,
}

/// Periodic driver for the resolver
pub struct ReloadScheduler {
    resolver: Resolver,
    interval: Duration,
    requests: mpsc::Receiver<ReloadRequest>,
    status_tx: watch::Sender<SupervisorStatus>,
}

impl ReloadScheduler {
    pub fn new(
        resolver: Resolver,
        interval: Duration,
        requests: mpsc::Receiver<ReloadRequest>,
        status_tx: watch::Sender<SupervisorStatus>,
    ) -> Self {
        Self {
            resolver,
            interval,
            requests,
            status_tx,
        }
    }

    /// Run until shutdown, or until a cycle fails before any has succeeded
    #[instrument(skip(self, shutdown), fields(interval_secs = self.interval.as_secs()))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let ReloadScheduler {
            mut resolver,
            interval: period,
            mut requests,
            status_tx,
        } = self;

        info!("Starting reload scheduler");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cycle = run_and_record(&mut resolver, &status_tx, "scheduled");
                    let Some(result) = until_shutdown(cycle, &mut shutdown).await else {
                        break Ok(());
                    };
                    if let Err(e) = check_fatal(result, &status_tx) {
                        break Err(e);
                    }
                }
                Some(request) = requests.recv() => {
                    let cycle = run_and_record(&mut resolver, &status_tx, "manual");
                    let Some(result) = until_shutdown(cycle, &mut shutdown).await else {
                        break Ok(());
                    };
                    let fatal = match &result {
                        Err(e) if !status_tx.borrow().ever_succeeded() => {
                            Some(SubvisorError::Internal(e.to_string()))
                        }
                        _ => None,
                    };
                    let _ = request.reply.send(result);
                    if let Some(e) = fatal {
                        break Err(e);
                    }
                }
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Reload scheduler shutting down");
                    break Ok(());
                }
            }
        };

        resolver.shutdown().await;
        status_tx.send_modify(|status| {
            status.active = None;
            status.pid = None;
            status.started_at = None;
        });

        outcome
    }
}

async fn run_and_record(
    resolver: &mut Resolver,
    status_tx: &watch::Sender<SupervisorStatus>,
    trigger: &str,
) -> Result<Resolution> {
    info!(trigger, "Starting resolution cycle");
    let result = resolver.run_cycle().await;

    let active = resolver.accepted().cloned();
    let process = resolver.current_process();

    status_tx.send_modify(|status| {
        let detail = match &result {
            Ok(resolution) => {
                status.successful_cycles += 1;
                resolution.candidate.display_name()
            }
            Err(e) => {
                status.failed_cycles += 1;
                e.to_string()
            }
        };
        status.active = active;
        status.pid = process.as_ref().map(|p| p.pid);
        status.started_at = process.as_ref().map(|p| p.started_at);
        status.last_cycle = Some(CycleReport {
            finished_at: Utc::now(),
            success: result.is_ok(),
            detail,
        });
    });

    result
}

/// Resolves once shutdown is requested or the handle is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Drive `cycle` to completion unless shutdown is requested first.
/// The cycle is dropped mid-flight in that case; any engine it started is
/// stopped by the caller.
async fn until_shutdown<F>(cycle: F, shutdown: &mut watch::Receiver<bool>) -> Option<F::Output>
where
    F: std::future::Future,
{
    tokio::select! {
        result = cycle => Some(result),
        _ = shutdown_requested(shutdown) => {
            warn!("Shutdown requested during resolution cycle, abandoning it");
            None
        }
    }
}

/// A failure is fatal only while no cycle has ever succeeded
fn check_fatal(
    result: Result<Resolution>,
    status_tx: &watch::Sender<SupervisorStatus>,
) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if !status_tx.borrow().ever_succeeded() => {
            error!(error = %e, "Resolution failed and no engine has ever started");
            Err(e)
        }
        Err(e) => {
            warn!(error = %e, "Resolution cycle failed, keeping current engine");
            Ok(())
        }
    }
}

/// Handle for driving and stopping the reload scheduler
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    reload_tx: mpsc::Sender<ReloadRequest>,
    status_rx: watch::Receiver<SupervisorStatus>,
}

/// Receiving ends owned by the scheduler task
pub struct SchedulerChannels {
    pub shutdown: watch::Receiver<bool>,
    pub requests: mpsc::Receiver<ReloadRequest>,
    pub status_tx: watch::Sender<SupervisorStatus>,
}

impl SchedulerHandle {
    pub fn new() -> (Self, SchedulerChannels) {
        let (shutdown_tx, shutdown) = watch::channel(false);
        let (reload_tx, requests) = mpsc::channel(8);
        let (status_tx, status_rx) = watch::channel(SupervisorStatus::default());

        (
            Self {
                shutdown_tx,
                reload_tx,
                status_rx,
            },
            SchedulerChannels {
                shutdown,
                requests,
                status_tx,
            },
        )
    }

    /// Queue a forced cycle and wait for its outcome
    pub async fn trigger(&self) -> Result<Resolution> {
        let (reply, outcome) = oneshot::channel();
        self.reload_tx
            .send(ReloadRequest { reply })
            .await
            .map_err(|_| SubvisorError::Internal("reload scheduler is not running".to_string()))?;

        outcome
            .await
            .map_err(|_| SubvisorError::Internal("reload scheduler dropped the request".to_string()))?
    }

    pub fn status(&self) -> SupervisorStatus {
        self.status_rx.borrow().clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
