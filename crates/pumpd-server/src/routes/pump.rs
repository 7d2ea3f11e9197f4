use axum::extract::State;
use axum::Json;
use pumpd_core::types::{BalanceChange, RunGrant};

use crate::error::AppError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct RunRequest {
    /// Requested run duration; fractional seconds truncate.
    pub seconds: f64,
}

fn whole_seconds(seconds: f64) -> u64 {
    seconds.max(0.0) as u64
}

/// POST /api/pump/timed — start or extend a timed run.
pub async fn start_timed(
    State(app): State<AppState>,
    Json(body): Json<RunRequest>,
) -> Result<Json<RunGrant>, AppError> {
    let grant = app.core.start_timed(whole_seconds(body.seconds)).await?;
    Ok(Json(grant))
}

/// POST /api/pump/banked — start or extend a run drawing banked time.
pub async fn start_banked(
    State(app): State<AppState>,
    Json(body): Json<RunRequest>,
) -> Result<Json<RunGrant>, AppError> {
    let grant = app.core.start_banked(whole_seconds(body.seconds)).await?;
    Ok(Json(grant))
}

#[derive(serde::Deserialize)]
pub struct ManualRequest {
    pub actor: u64,
}

/// POST /api/pump/on — open-ended manual run (wearer only).
pub async fn manual_on(
    State(app): State<AppState>,
    Json(body): Json<ManualRequest>,
) -> Result<Json<BalanceChange>, AppError> {
    let change = app.core.manual_on(body.actor).await?;
    Ok(Json(change))
}

/// POST /api/pump/off — stop the pump and any live run (wearer only).
pub async fn manual_off(
    State(app): State<AppState>,
    Json(body): Json<ManualRequest>,
) -> Result<Json<BalanceChange>, AppError> {
    let change = app.core.manual_off(body.actor).await?;
    Ok(Json(change))
}
