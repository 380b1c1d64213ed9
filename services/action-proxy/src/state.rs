use action_runtime::{ConfigError, LifecycleController, RuntimeConfig};
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// AppState — the one context object every handler shares
//
// The lifecycle controller sits behind a single async mutex: init and run
// are mutually exclusive and admitted in arrival order (tokio's Mutex is
// FIFO-fair). /ping never touches it.
// ---------------------------------------------------------------------------

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("{var}: expected a TCP port, got {value:?}")]
    BadPort { var: &'static str, value: String },

    #[error(transparent)]
    Runtime(#[from] ConfigError),
}

impl Config {
    /// `PORT` (or legacy `FLASK_PORT`) plus the `ACTION_*` runtime knobs.
    pub fn from_env() -> Result<Self, StartupError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, StartupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match ["PORT", "FLASK_PORT"]
            .into_iter()
            .find_map(|var| lookup(var).map(|v| (var, v)))
        {
            Some((var, value)) => value
                .trim()
                .parse()
                .map_err(|_| StartupError::BadPort { var, value })?,
            None => DEFAULT_PORT,
        };
        Ok(Self {
            port,
            runtime: RuntimeConfig::from_lookup(lookup)?,
        })
    }
}

pub struct AppState {
    pub controller: Mutex<LifecycleController>,
}

impl AppState {
    pub fn new(runtime: &RuntimeConfig) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            controller: Mutex::new(LifecycleController::new(runtime)),
        })
    }
}
