use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// RuntimeConfig — knobs for artifact placement and child invocation
//
// Plain value type. The service builds one from the environment at startup;
// tests build one directly so nothing touches process-wide state.
// ---------------------------------------------------------------------------

pub const DEFAULT_ACTION_PATH: &str = "/action/exec";
pub const DEFAULT_VERIFY_ARG: &str = "verify";
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: expected a non-negative integer, got {value:?}")]
    NotANumber { var: &'static str, value: String },

    #[error("{var}: expected one of relay|fail, got {value:?}")]
    UnknownExitPolicy { var: &'static str, value: String },
}

/// What `run` does when the child exits non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitPolicy {
    /// Relay whatever the child printed; only an empty stdout is an error.
    #[default]
    Relay,
    /// Any non-zero exit is reported as an error.
    Fail,
}

impl FromStr for ExitPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relay" => Ok(ExitPolicy::Relay),
            "fail" => Ok(ExitPolicy::Fail),
            _ => Err(ConfigError::UnknownExitPolicy {
                var: "ACTION_NONZERO_EXIT",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Fixed slot the artifact is written to and executed from.
    pub action_path: PathBuf,
    /// Single argument passed on the verification call.
    pub verify_arg: String,
    /// Wall-clock limit per invocation; `None` waits forever.
    pub timeout: Option<Duration>,
    /// Bytes retained per output stream; the rest is drained and dropped.
    pub output_limit: usize,
    pub exit_policy: ExitPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            action_path: PathBuf::from(DEFAULT_ACTION_PATH),
            verify_arg: DEFAULT_VERIFY_ARG.to_string(),
            timeout: None,
            output_limit: DEFAULT_OUTPUT_LIMIT_BYTES,
            exit_policy: ExitPolicy::Relay,
        }
    }
}

impl RuntimeConfig {
    /// Config rooted at `action_path` with every other knob at its default.
    pub fn at(action_path: impl Into<PathBuf>) -> Self {
        Self {
            action_path: action_path.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.exit_policy = policy;
        self
    }

    pub fn with_output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }

    /// Read `ACTION_*` variables, falling back to defaults for absent ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(p) = lookup("ACTION_PATH").filter(|s| !s.is_empty()) {
            cfg.action_path = PathBuf::from(p);
        }
        if let Some(a) = lookup("ACTION_VERIFY_ARG").filter(|s| !s.is_empty()) {
            cfg.verify_arg = a;
        }
        if let Some(ms) = lookup("ACTION_TIMEOUT_MS") {
            let ms = parse_u64("ACTION_TIMEOUT_MS", &ms)?;
            // 0 means "no limit", same as unset
            cfg.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(limit) = lookup("ACTION_OUTPUT_LIMIT_BYTES") {
            cfg.output_limit = parse_u64("ACTION_OUTPUT_LIMIT_BYTES", &limit)? as usize;
        }
        if let Some(p) = lookup("ACTION_NONZERO_EXIT") {
            cfg.exit_policy = p.parse()?;
        }
        Ok(cfg)
    }
}

fn parse_u64(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::NotANumber {
        var,
        value: value.to_string(),
    })
}
