use pumpd_core::Core;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub core: Core,
}
