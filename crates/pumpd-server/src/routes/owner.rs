use axum::extract::State;
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

#[derive(serde::Deserialize)]
pub struct ClaimRequest {
    pub id: u64,
    pub secret: String,
}

/// POST /api/owner/claim — register the caller as the device's wearer.
/// The front end is responsible for only accepting the secret over a
/// private channel.
pub async fn claim(
    State(app): State<AppState>,
    Json(body): Json<ClaimRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    app.core.claim_owner(body.id, &body.secret).await?;
    Ok(Json(serde_json::json!({
        "status": "claimed",
        "message": "you are now registered as this device's wearer",
    })))
}
