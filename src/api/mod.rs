//! Admin API
//!
//! Local HTTP endpoints for liveness, status, and forcing a reload.

pub mod handlers;
pub mod routes;
pub mod server;

pub use server::ApiServer;
