pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use std::sync::Arc;

/// Build the init/run/ping router.
/// Used by main.rs and integration tests.
pub fn build_router(state: Arc<state::AppState>) -> Router {
    Router::new()
        .merge(routes::init::router())
        .merge(routes::run::router())
        .merge(routes::ping::router())
        .with_state(state)
}
