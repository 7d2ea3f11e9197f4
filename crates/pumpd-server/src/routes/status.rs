use axum::extract::State;
use axum::Json;
use pumpd_core::types::StatusReport;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/status — snapshot of device, balances, latch, and run state.
pub async fn get_status(State(app): State<AppState>) -> Json<StatusReport> {
    Json(app.core.query_status().await)
}

/// GET /api/ping — direct liveness probe of the actuator service.
pub async fn ping(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    app.core.ping_device().await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
