use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ping", get(ping))
}

// Never touches the controller, so it answers while a run holds the lock.
async fn ping() -> Json<Health> {
    Json(Health { status: "OK" })
}
