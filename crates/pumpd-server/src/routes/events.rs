use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// GET /api/events — SSE stream of core events (status changes, latch
/// expiry, service transitions) as JSON.
pub async fn sse_events(State(app): State<AppState>) -> impl axum::response::IntoResponse {
    let rx = app.core.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        msg.ok()
            .and_then(|event| serde_json::to_string(&event).ok())
            .map(|data| Ok::<Event, Infallible>(Event::default().event("core").data(data)))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
