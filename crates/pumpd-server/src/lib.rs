pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use pumpd_core::Core;
use tower_http::cors::{Any, CorsLayer};

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(core: Core) -> Router {
    let app_state = state::AppState { core };

    // Wide-open CORS: browser front ends talk to this API directly instead
    // of needing a separate relay.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Status
        .route("/api/status", get(routes::status::get_status))
        .route("/api/ping", get(routes::status::ping))
        // Ownership
        .route("/api/owner/claim", post(routes::owner::claim))
        // Latch
        .route("/api/latch", post(routes::latch::set_latch))
        // Runs
        .route("/api/pump/timed", post(routes::pump::start_timed))
        .route("/api/pump/banked", post(routes::pump::start_banked))
        .route("/api/pump/on", post(routes::pump::manual_on))
        .route("/api/pump/off", post(routes::pump::manual_off))
        // Session balance
        .route("/api/session/add", post(routes::session::add_time))
        .route("/api/session/set", post(routes::session::set_time))
        .route("/api/session/reset", post(routes::session::reset_time))
        .route("/api/note", post(routes::session::set_note))
        .layer(cors)
        .with_state(app_state)
}

/// Serve the control API on a pre-bound listener until ctrl-c, then wind the
/// core down (any live run finishes its full cleanup sequence first).
pub async fn serve(core: Core, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(core.clone());

    tracing::info!("pumpd control API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(core))
        .await?;
    Ok(())
}

async fn shutdown_signal(core: Core) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutting down, stopping any live run");
    core.shutdown().await;
}
