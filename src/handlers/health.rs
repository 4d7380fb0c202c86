//! Health and diagnostics endpoints.
//!
//! - `GET /v1/healthcheck` - liveness with environment and version
//! - `GET /debug/vars` - cumulative request counters and runtime gauges

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::{DebugVarsResponse, HealthResponse, SystemInfo};
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "available",
///   "system_info": { "environment": "development", "version": "0.1.0" }
/// }
/// ```
#[instrument(skip(state))]
pub async fn healthcheck(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "available".to_string(),
        system_info: SystemInfo {
            environment: state.config.environment.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    })
}

#[instrument(skip(state))]
pub async fn debug_vars(State(state): State<AppState>) -> Json<DebugVarsResponse> {
    Json(DebugVarsResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: state.uptime_seconds(),
        background_tasks: state.background.outstanding(),
        rate_limited_clients: state.limiter.as_ref().map_or(0, |registry| registry.len()),
        requests: state.request_metrics.snapshot(),
    })
}
