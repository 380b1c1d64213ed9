//! Error taxonomy for the action runtime.
//!
//! Every failure the proxy can report maps to exactly one [`ActionError`]
//! variant. The `Display` text is the string placed under `"error"` on the
//! wire, so messages stay stable across releases.

use std::fmt;

use thiserror::Error;

/// Structured code following the `Err.Action.<Detail>` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NoArtifact,
    Decode,
    InvalidPayload,
    Persistence,
    Spawn,
    VerificationFailed,
    NotReady,
    NoOutput,
    OutputTruncated,
    ActionFailed,
    Timeout,
    Io,
}

impl ErrorCode {
    /// Canonical string representation: `Err.Action.<Detail>`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoArtifact => "Err.Action.NoArtifact",
            Self::Decode => "Err.Action.Decode",
            Self::InvalidPayload => "Err.Action.InvalidPayload",
            Self::Persistence => "Err.Action.Persistence",
            Self::Spawn => "Err.Action.Spawn",
            Self::VerificationFailed => "Err.Action.VerificationFailed",
            Self::NotReady => "Err.Action.NotReady",
            Self::NoOutput => "Err.Action.NoOutput",
            Self::OutputTruncated => "Err.Action.OutputTruncated",
            Self::ActionFailed => "Err.Action.Failed",
            Self::Timeout => "Err.Action.Timeout",
            Self::Io => "Err.Action.Io",
        }
    }

    /// Recommended HTTP status code for API responses.
    pub fn http_status(&self) -> u16 {
        match self {
            // 400 — caller sent something unusable
            Self::NoArtifact | Self::Decode | Self::InvalidPayload => 400,

            // 500 — proxy-side filesystem / stream failure
            Self::Persistence | Self::Io => 500,

            // 502 — the artifact misbehaved
            Self::Spawn
            | Self::VerificationFailed
            | Self::NoOutput
            | Self::OutputTruncated
            | Self::ActionFailed => 502,

            // 503 — not initialized
            Self::NotReady => 503,

            // 504 — wall-clock limit hit
            Self::Timeout => 504,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Which invocation an error came from. Init and run report spawn failures
/// with different wire prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => f.write_str("initialize"),
            Phase::Run => f.write_str("run"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("No action code or executable found.")]
    NoArtifact,

    #[error("Failed to decode binary action: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Invalid init payload: {0}")]
    InvalidPayload(String),

    #[error("Failed to persist action to {path}: {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to {phase} action: {source}")]
    Spawn {
        phase: Phase,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialize action: {stderr}")]
    VerificationFailed { exit_code: Option<i32>, stderr: String },

    #[error("Action not initialized or failed initialization.")]
    NotReady,

    #[error("Action returned no result: {stderr}")]
    NoOutput { stderr: String },

    #[error("Action output exceeded {limit} bytes and was cut short")]
    OutputTruncated { limit: usize },

    #[error("Action exited with status {}: {stderr}", display_exit(.exit_code))]
    ActionFailed { exit_code: Option<i32>, stderr: String },

    #[error("Action timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("I/O error while talking to action: {0}")]
    Io(#[source] std::io::Error),
}

fn display_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "signal".to_string(),
    }
}

impl ActionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoArtifact => ErrorCode::NoArtifact,
            Self::Decode(_) => ErrorCode::Decode,
            Self::InvalidPayload(_) => ErrorCode::InvalidPayload,
            Self::Persistence { .. } => ErrorCode::Persistence,
            Self::Spawn { .. } => ErrorCode::Spawn,
            Self::VerificationFailed { .. } => ErrorCode::VerificationFailed,
            Self::NotReady => ErrorCode::NotReady,
            Self::NoOutput { .. } => ErrorCode::NoOutput,
            Self::OutputTruncated { .. } => ErrorCode::OutputTruncated,
            Self::ActionFailed { .. } => ErrorCode::ActionFailed,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Io(_) => ErrorCode::Io,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.code().http_status()
    }

    /// JSON body for HTTP error responses: `{"error": "<message>"}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }

    pub(crate) fn persistence(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_format() {
        assert_eq!(ErrorCode::NotReady.code(), "Err.Action.NotReady");
        assert_eq!(ErrorCode::ActionFailed.code(), "Err.Action.Failed");
        assert_eq!(ActionError::NoArtifact.code(), ErrorCode::NoArtifact);
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ErrorCode::Decode.http_status(), 400);
        assert_eq!(ErrorCode::Persistence.http_status(), 500);
        assert_eq!(ErrorCode::VerificationFailed.http_status(), 502);
        assert_eq!(ErrorCode::OutputTruncated.http_status(), 502);
        assert_eq!(ErrorCode::NotReady.http_status(), 503);
        assert_eq!(ErrorCode::Timeout.http_status(), 504);
    }

    #[test]
    fn wire_messages_match_protocol() {
        assert_eq!(
            ActionError::NotReady.to_string(),
            "Action not initialized or failed initialization."
        );
        let err = ActionError::VerificationFailed {
            exit_code: Some(1),
            stderr: "boom\n".into(),
        };
        assert_eq!(err.to_string(), "Failed to initialize action: boom\n");
        let err = ActionError::NoOutput { stderr: "nothing".into() };
        assert_eq!(err.to_json()["error"], "Action returned no result: nothing");
    }

    #[test]
    fn spawn_message_names_phase() {
        let err = ActionError::Spawn {
            phase: Phase::Run,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(err.to_string(), "Failed to run action: missing");
    }

    #[test]
    fn action_failed_reports_signal_when_no_code() {
        let err = ActionError::ActionFailed { exit_code: None, stderr: String::new() };
        assert!(err.to_string().contains("signal"));
    }
}
