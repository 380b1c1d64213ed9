use action_runtime::{ActionError, ArtifactPayload, EnvironmentBindings};
use axum::{body::Bytes, extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// POST /init — {"value": {"code"?, "binary"?, "env"?}}
//
// The payload shape is resolved here, once, into an ArtifactPayload. A body
// that is missing or not JSON counts as "no message" (adopt whatever sits in
// the slot), matching what platform clients have always relied on.
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct InitMessage {
    #[serde(default)]
    pub value: Option<InitValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InitValue {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub binary: Option<BinaryField>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// `binary` is either the base64 payload itself, or a flag saying `code`
/// holds base64 (the form newer platform releases send).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BinaryField {
    Flag(bool),
    Payload(String),
}

impl InitValue {
    pub fn into_parts(self) -> (ArtifactPayload, EnvironmentBindings) {
        let payload = match (self.code, self.binary) {
            (Some(code), Some(BinaryField::Flag(true))) => ArtifactPayload::Binary(code),
            (Some(code), _) => ArtifactPayload::Source(code),
            (None, Some(BinaryField::Payload(encoded))) => ArtifactPayload::Binary(encoded),
            (None, _) => ArtifactPayload::PreExisting,
        };
        (payload, EnvironmentBindings::new(self.env))
    }
}

pub fn parse_init_body(body: &[u8]) -> Result<InitMessage, ActionError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(v @ Value::Object(_)) => {
            serde_json::from_value(v).map_err(|e| ActionError::InvalidPayload(e.to_string()))
        }
        _ => Ok(InitMessage::default()),
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/init", post(init))
}

async fn init(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let parsed = parse_init_body(&body);

    let mut ctl = state.controller.lock().await;
    let msg = match parsed {
        Ok(msg) => msg,
        Err(e) => return Err(ctl.reject_init(e).into()),
    };
    let (payload, env) = msg.value.unwrap_or_default().into_parts();
    ctl.initialize(payload, env).await?;
    Ok(Json(serde_json::json!({ "OK": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(body: &str) -> (ArtifactPayload, EnvironmentBindings) {
        parse_init_body(body.as_bytes())
            .unwrap()
            .value
            .unwrap_or_default()
            .into_parts()
    }

    #[test]
    fn code_is_source() {
        let (p, env) = parts(r##"{"value": {"code": "#!/bin/sh", "env": {"K": "V"}}}"##);
        assert_eq!(p, ArtifactPayload::Source("#!/bin/sh".into()));
        assert_eq!(env.get("K"), Some("V"));
    }

    #[test]
    fn binary_string_is_binary() {
        let (p, _) = parts(r#"{"value": {"binary": "IyEvYmluL3No"}}"#);
        assert_eq!(p, ArtifactPayload::Binary("IyEvYmluL3No".into()));
    }

    #[test]
    fn binary_flag_marks_code_as_base64() {
        let (p, _) = parts(r#"{"value": {"code": "IyEvYmluL3No", "binary": true, "main": "main"}}"#);
        assert_eq!(p, ArtifactPayload::Binary("IyEvYmluL3No".into()));

        let (p, _) = parts(r#"{"value": {"code": "echo", "binary": false}}"#);
        assert_eq!(p, ArtifactPayload::Source("echo".into()));
    }

    #[test]
    fn code_wins_over_binary_payload() {
        let (p, _) = parts(r#"{"value": {"code": "text", "binary": "IyE="}}"#);
        assert_eq!(p, ArtifactPayload::Source("text".into()));
    }

    #[test]
    fn empty_or_garbage_body_means_pre_existing() {
        for body in ["", "not json", "null", "[1,2]", "{}", r#"{"value": {}}"#] {
            assert_eq!(parts(body).0, ArtifactPayload::PreExisting, "body {body:?}");
        }
    }

    #[test]
    fn wrongly_typed_fields_are_rejected() {
        let err = parse_init_body(br#"{"value": {"code": 12}}"#).unwrap_err();
        assert!(matches!(err, ActionError::InvalidPayload(_)));
        let err = parse_init_body(br#"{"value": {"env": {"K": 1}}}"#).unwrap_err();
        assert!(matches!(err, ActionError::InvalidPayload(_)));
    }
}
