//! Loopback fixtures and test doubles shared by unit tests

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;

use crate::config::EngineSettings;
use crate::engine::{ConfigBuilder, EngineControl, ProcessInfo};
use crate::error::{Result, SubvisorError};
use crate::models::{Candidate, EngineConfig, ShadowsocksCandidate};
use crate::probe::{FunctionalCheck, ReachabilityProber, SelectionPolicy};
use crate::services::Resolver;
use crate::subscription::SubscriptionSource;

/// Serve `router` on an ephemeral loopback port
pub async fn serve_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// A loopback address with nothing listening on it
pub async fn unused_local_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Accepting loopback listener kept alive for the returned guard's lifetime
pub async fn live_local_addr() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });
    (addr, task)
}

pub fn ss_candidate(name: &str, addr: SocketAddr) -> Candidate {
    Candidate::Shadowsocks(ShadowsocksCandidate {
        name: Some(name.to_string()),
        host: addr.ip().to_string(),
        port: addr.port(),
        method: "aes-128-gcm".to_string(),
        password: "secret".to_string(),
    })
}

/// Subscription source replaying queued responses; empty queue means fetch failure
#[derive(Clone, Default)]
pub struct ScriptedSource {
    responses: Arc<Mutex<VecDeque<Result<Vec<Candidate>>>>>,
}

impl ScriptedSource {
    pub fn push(&self, response: Result<Vec<Candidate>>) {
        self.responses.lock().unwrap().push_back(response);
    }
}

#[async_trait]
impl SubscriptionSource for ScriptedSource {
    async fn fetch(&self) -> Result<Vec<Candidate>> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(SubvisorError::FetchFailed {
                    status: None,
                    message: "no scripted response".to_string(),
                })
            })
    }
}

#[derive(Default)]
pub struct EngineLog {
    pub started: Vec<EngineConfig>,
    pub stops: usize,
    pub running: Option<ProcessInfo>,
    pub next_pid: u32,
    pub exited: bool,
}

/// Engine double recording every start and stop
#[derive(Clone, Default)]
pub struct RecordingEngine {
    pub log: Arc<Mutex<EngineLog>>,
}

impl RecordingEngine {
    pub fn starts(&self) -> usize {
        self.log.lock().unwrap().started.len()
    }

    pub fn last_outbound_port(&self) -> Option<u16> {
        let log = self.log.lock().unwrap();
        let outbound = log.started.last()?.outbound()?.clone();
        outbound
            .settings
            .servers
            .first()
            .map(|s| s.port)
            .or_else(|| outbound.settings.vnext.first().map(|v| v.port))
    }

    /// Simulate the engine dying on its own
    pub fn crash(&self) {
        self.log.lock().unwrap().exited = true;
    }
}

#[async_trait]
impl EngineControl for RecordingEngine {
    async fn start(&mut self, config: &EngineConfig) -> Result<ProcessInfo> {
        let mut log = self.log.lock().unwrap();
        if log.running.take().is_some() {
            log.stops += 1;
        }
        log.next_pid += 1;
        let info = ProcessInfo {
            pid: 1000 + log.next_pid,
            started_at: chrono::Utc::now(),
        };
        log.started.push(config.clone());
        log.running = Some(info.clone());
        log.exited = false;
        Ok(info)
    }

    async fn stop(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.running.take().is_some() {
            log.stops += 1;
        }
        Ok(())
    }

    fn current(&self) -> Option<ProcessInfo> {
        self.log.lock().unwrap().running.clone()
    }

    fn reap_exited(&mut self) -> bool {
        let mut log = self.log.lock().unwrap();
        if log.exited && log.running.is_some() {
            log.running = None;
            log.exited = false;
            return true;
        }
        false
    }
}

/// Functional check replaying queued verdicts; empty queue means failure
#[derive(Clone, Default)]
pub struct ScriptedCheck {
    verdicts: Arc<Mutex<VecDeque<bool>>>,
    retries: Arc<Mutex<Vec<u32>>>,
    delay: Duration,
}

impl ScriptedCheck {
    /// A check that stalls for `delay` before every verdict
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn push(&self, verdict: bool) {
        self.verdicts.lock().unwrap().push_back(verdict);
    }

    pub fn calls(&self) -> usize {
        self.retries.lock().unwrap().len()
    }

    /// Retry budget passed on each call
    pub fn retries_seen(&self) -> Vec<u32> {
        self.retries.lock().unwrap().clone()
    }
}

#[async_trait]
impl FunctionalCheck for ScriptedCheck {
    async fn probe(&self, retries: u32) -> Result<()> {
        self.retries.lock().unwrap().push(retries);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let verdict = self.verdicts.lock().unwrap().pop_front();
        match verdict {
            Some(true) => Ok(()),
            _ => Err(SubvisorError::ProbeFailed(format!(
                "{} attempt(s) failed, last error: scripted",
                retries
            ))),
        }
    }
}

pub fn engine_settings() -> EngineSettings {
    EngineSettings {
        binary: "v2ray".to_string(),
        args: vec![],
        listen: "127.0.0.1".to_string(),
        http_port: 1087,
        socks_port: 1080,
        log_level: "info".to_string(),
    }
}

/// Resolver wired to the given doubles, probing with the ordered policy
pub fn resolver_with(
    source: &ScriptedSource,
    engine: &RecordingEngine,
    check: &ScriptedCheck,
) -> Resolver {
    Resolver::new(
        Box::new(source.clone()),
        ReachabilityProber::new(Duration::from_millis(500), SelectionPolicy::Ordered),
        ConfigBuilder::new(&engine_settings()),
        Box::new(engine.clone()),
        Box::new(check.clone()),
        3,
    )
}
