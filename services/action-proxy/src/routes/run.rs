use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use serde::de::IgnoredAny;
use serde_json::value::RawValue;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// POST /run — body forwarded verbatim to the artifact's stdin
//
// Valid JSON goes through byte-for-byte; an empty or non-JSON body is
// forwarded as `null`. JSON stdout comes back just as untouched.
// ---------------------------------------------------------------------------

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/run", post(run))
}

pub fn run_input(body: &[u8]) -> &[u8] {
    if serde_json::from_slice::<IgnoredAny>(body).is_ok() {
        body
    } else {
        b"null"
    }
}

async fn run(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<Box<RawValue>>, ApiError> {
    let input = run_input(&body);

    let ctl = state.controller.lock().await;
    match ctl.run(input).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            tracing::warn!(code = %e.code(), error = %e, "action.run.failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_kept_when_it_is_json() {
        let body = br#"{"zeta":1,"alpha":2,"big":123456789012345678901234567890}"#;
        assert_eq!(run_input(body), body);
        assert_eq!(run_input(b" [1, 2]\n"), b" [1, 2]\n");
    }

    #[test]
    fn anything_else_becomes_null() {
        assert_eq!(run_input(b""), b"null");
        assert_eq!(run_input(b"{oops"), b"null");
        assert_eq!(run_input(b"{} trailing"), b"null");
    }
}
