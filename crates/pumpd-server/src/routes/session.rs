use axum::extract::State;
use axum::Json;
use pumpd_core::types::BalanceChange;

use crate::error::AppError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct TimeRequest {
    pub actor: u64,
    pub minutes: u64,
}

#[derive(serde::Deserialize)]
pub struct ActorRequest {
    pub actor: u64,
}

/// POST /api/session/add — add minutes to the session balance (wearer only).
pub async fn add_time(
    State(app): State<AppState>,
    Json(body): Json<TimeRequest>,
) -> Result<Json<BalanceChange>, AppError> {
    let change = app.core.add_time(body.actor, body.minutes).await?;
    Ok(Json(change))
}

/// POST /api/session/set — set the session balance and its reset default
/// (wearer only).
pub async fn set_time(
    State(app): State<AppState>,
    Json(body): Json<TimeRequest>,
) -> Result<Json<BalanceChange>, AppError> {
    let change = app.core.set_time(body.actor, body.minutes).await?;
    Ok(Json(change))
}

/// POST /api/session/reset — restore the default session balance
/// (wearer only).
pub async fn reset_time(
    State(app): State<AppState>,
    Json(body): Json<ActorRequest>,
) -> Result<Json<BalanceChange>, AppError> {
    let change = app.core.reset_time(body.actor).await?;
    Ok(Json(change))
}

#[derive(serde::Deserialize)]
pub struct NoteRequest {
    pub actor: u64,
    /// Omit or null to clear.
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /api/note — set or clear the cosmetic status note (wearer only).
pub async fn set_note(
    State(app): State<AppState>,
    Json(body): Json<NoteRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    app.core.set_note(body.actor, body.note).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
