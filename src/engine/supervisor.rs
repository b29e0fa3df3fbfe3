//! Engine process supervision
//!
//! # States
//! - Stopped: no child process
//! - Running: one child, identified by pid, with its start time
//!
//! # Transitions
//! ```text
//! Stopped → Running: start(config) spawned the engine and delivered the config
//! Running → Running: start(config) stops the old child first, then spawns
//! Running → Stopped: stop(), a failed start(), or the child exiting on its own
//! ```
//!
//! At most one child is alive at any time. The child gets a minimal
//! environment (`PATH` only) and inherits stdout/stderr.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use crate::config::EngineSettings;
use crate::error::{Result, SubvisorError};
use crate::models::EngineConfig;

/// Upper bound on waiting for a killed engine to be reaped
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity of the running engine instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Lifecycle control over the external engine
#[async_trait]
pub trait EngineControl: Send {
    /// Replace any running instance with one configured by `config`
    async fn start(&mut self, config: &EngineConfig) -> Result<ProcessInfo>;

    /// Terminate and reap the running instance, if any
    async fn stop(&mut self) -> Result<()>;

    fn current(&self) -> Option<ProcessInfo>;

    /// Reap an instance that exited on its own; true if one did
    fn reap_exited(&mut self) -> bool;
}

/// A live engine child owned by the supervisor
#[derive(Debug)]
pub struct SupervisedProcess {
    child: Child,
    info: ProcessInfo,
}

#[derive(Debug, Default)]
enum EngineState {
    #[default]
    Stopped,
    Running(SupervisedProcess),
}

/// Owns the single engine child process
#[derive(Debug)]
pub struct ProcessSupervisor {
    binary: String,
    args: Vec<String>,
    state: EngineState,
}

impl ProcessSupervisor {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            binary: settings.binary.clone(),
            args: settings.args.clone(),
            state: EngineState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, EngineState::Running(_))
    }

    /// Stop the engine during shutdown, logging rather than returning failures
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stop().await {
            error!("Engine shutdown failed: {}", e);
        }
    }

    fn spawn(&self) -> Result<Child> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args).env_clear();
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        cmd.spawn().map_err(|e| {
            SubvisorError::Supervisor(format!("failed to launch '{}': {}", self.binary, e))
        })
    }
}

#[async_trait]
impl EngineControl for ProcessSupervisor {
    async fn start(&mut self, config: &EngineConfig) -> Result<ProcessInfo> {
        let payload = config.to_stdin_payload().map_err(|e| {
            SubvisorError::Supervisor(format!("failed to serialize engine config: {}", e))
        })?;

        self.stop().await?;

        let mut child = self.spawn()?;
        let Some(pid) = child.id() else {
            return Err(SubvisorError::Supervisor(
                "engine exited before its pid could be read".to_string(),
            ));
        };

        if let Err(e) = deliver_config(&mut child, &payload).await {
            let _ = child.kill().await;
            return Err(SubvisorError::Supervisor(format!(
                "failed to deliver config to engine pid {}: {}",
                pid, e
            )));
        }

        let info = ProcessInfo {
            pid,
            started_at: Utc::now(),
        };
        self.state = EngineState::Running(SupervisedProcess {
            child,
            info: info.clone(),
        });

        info!(pid, binary = %self.binary, "Engine process started");
        Ok(info)
    }

    async fn stop(&mut self) -> Result<()> {
        let EngineState::Running(mut process) = std::mem::take(&mut self.state) else {
            return Ok(());
        };
        let pid = process.info.pid;

        info!(pid, "Stopping engine process");

        if let Err(e) = process.child.start_kill() {
            // Already exited; the wait below reaps it.
            warn!(pid, error = %e, "Failed to signal engine process");
        }

        match tokio::time::timeout(STOP_TIMEOUT, process.child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid, status = %status, "Engine process stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(SubvisorError::Supervisor(format!(
                "failed to reap engine pid {}: {}",
                pid, e
            ))),
            Err(_) => Err(SubvisorError::Supervisor(format!(
                "engine pid {} did not exit within {:?}",
                pid, STOP_TIMEOUT
            ))),
        }
    }

    fn current(&self) -> Option<ProcessInfo> {
        match &self.state {
            EngineState::Running(process) => Some(process.info.clone()),
            EngineState::Stopped => None,
        }
    }

    fn reap_exited(&mut self) -> bool {
        let EngineState::Running(process) = &mut self.state else {
            return false;
        };

        let exited: Option<ExitStatus> = match process.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!(pid = process.info.pid, error = %e, "Failed to poll engine process");
                None
            }
        };

        match exited {
            Some(status) => {
                warn!(pid = process.info.pid, status = %status, "Engine process exited unexpectedly");
                self.state = EngineState::Stopped;
                true
            }
            None => false,
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if let EngineState::Running(process) = &mut self.state {
            // Best effort kill
            let _ = process.child.start_kill();
        }
    }
}

async fn deliver_config(child: &mut Child, payload: &[u8]) -> std::io::Result<()> {
    let mut stdin = child.stdin.take().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "engine stdin not captured")
    })?;

    stdin.write_all(payload).await?;
    stdin.flush().await?;
    // Dropping stdin closes the pipe so the engine sees EOF.
    drop(stdin);
    Ok(())
}
