//! Subvisor - Subscription Proxy Supervisor
//!
//! Resolves proxy endpoints from a subscription feed and keeps an external
//! proxy engine running on one that actually works.
//!
//! ## Features
//!
//! - `vmess://` and `ss://` subscription links (legacy and SIP002)
//! - Concurrent reachability probing under one shared deadline
//! - End-to-end functional probing through the running engine
//! - Single supervised engine child with clean restarts
//! - Periodic re-resolution with failover and fallback to the last good candidate
//! - Admin API for status and forced reloads

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod probe;
pub mod services;
pub mod subscription;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::{Result, SubvisorError};
