//! Admin API server using Axum
//!
//! Exposes liveness, supervisor status, and a forced-reload trigger.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::ApiServerConfig;
use crate::error::{Result, SubvisorError};
use crate::services::SchedulerHandle;

use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<SchedulerHandle>,
    pub started_at: Instant,
}

/// Admin API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, scheduler: Arc<SchedulerHandle>) -> Self {
        Self {
            config,
            state: AppState {
                scheduler,
                started_at: Instant::now(),
            },
        }
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        routes::create_router(self.state.clone()).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| SubvisorError::InvalidConfig(format!("invalid API address: {}", e)))?;

        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("API server listening on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| SubvisorError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
