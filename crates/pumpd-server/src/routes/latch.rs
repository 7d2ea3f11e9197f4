use axum::extract::State;
use axum::Json;
use pumpd_core::types::LatchChange;

use crate::error::AppError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct LatchRequest {
    pub actor: u64,
    /// `None` toggles.
    #[serde(default)]
    pub state: Option<bool>,
    #[serde(default)]
    pub minutes: Option<u64>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/latch — toggle, set, or time-limit the latch (wearer only).
pub async fn set_latch(
    State(app): State<AppState>,
    Json(body): Json<LatchRequest>,
) -> Result<Json<LatchChange>, AppError> {
    let change = app
        .core
        .latch(body.actor, body.state, body.minutes, body.reason)
        .await?;
    Ok(Json(change))
}
