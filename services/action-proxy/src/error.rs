use action_runtime::ActionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Wire form of every failure: the runtime's status code and `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError(pub ActionError);

impl From<ActionError> for ApiError {
    fn from(e: ActionError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_json())).into_response()
    }
}
