//! Forced reload endpoint

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use crate::api::server::AppState;
use crate::error::Result;

/// Run one resolution cycle on the scheduler task and report its outcome
pub async fn force_cycle(State(state): State<AppState>) -> Result<Json<Value>> {
    info!("Forced resolution cycle requested");

    let resolution = state.scheduler.trigger().await?;

    Ok(Json(json!({
        "status": "ok",
        "candidate": resolution.candidate.display_name(),
        "address": resolution.candidate.address(),
        "pid": resolution.process.pid,
        "started_at": resolution.process.started_at,
    })))
}
