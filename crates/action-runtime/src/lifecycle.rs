use serde_json::value::RawValue;

use crate::artifact::{ActionArtifact, ArtifactPayload, ArtifactStore, EnvironmentBindings};
use crate::config::{ExitPolicy, RuntimeConfig};
use crate::errors::{ActionError, Phase};
use crate::invoker::ProcessInvoker;
use crate::outcome;

// ---------------------------------------------------------------------------
// Lifecycle Controller — readiness state machine
//
//   Uninitialized ──init──> Initializing ──verify exit 0──> Ready
//                                │
//                                └──install/verify fails──> Failed
//   Ready | Failed ──init──> Initializing   (no terminal state)
//
// Owns the artifact slot, the environment bindings and the invoker. Callers
// serialize access (the service holds it behind one async mutex), so every
// method takes `&mut self` or `&self` without interior locking.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

#[derive(Debug)]
pub struct LifecycleController {
    store: ArtifactStore,
    invoker: ProcessInvoker,
    verify_arg: String,
    exit_policy: ExitPolicy,
    output_limit: usize,
    state: LifecycleState,
    env: EnvironmentBindings,
    artifact: Option<ActionArtifact>,
    last_failure: Option<String>,
}

impl LifecycleController {
    pub fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            store: ArtifactStore::new(&cfg.action_path),
            invoker: ProcessInvoker::new(&cfg.action_path, cfg.timeout, cfg.output_limit),
            verify_arg: cfg.verify_arg.clone(),
            exit_policy: cfg.exit_policy,
            output_limit: cfg.output_limit,
            state: LifecycleState::Uninitialized,
            env: EnvironmentBindings::default(),
            artifact: None,
            last_failure: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }

    /// The artifact installed by the last init, if it carried a payload.
    pub fn artifact(&self) -> Option<&ActionArtifact> {
        self.artifact.as_ref()
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Install (or adopt) the artifact, bind `env`, and verify it runs.
    ///
    /// Any failure leaves the controller `Failed`; the error carries the
    /// reason. A pre-existing artifact with no payload skips verification.
    pub async fn initialize(
        &mut self,
        payload: ArtifactPayload,
        env: EnvironmentBindings,
    ) -> Result<(), ActionError> {
        let from = self.state;
        self.state = LifecycleState::Initializing;
        tracing::info!(?from, payload = payload_label(&payload), env_vars = env.len(), "action.init.start");

        match self.try_initialize(payload, env).await {
            Ok(()) => {
                self.state = LifecycleState::Ready;
                self.last_failure = None;
                tracing::info!(path = %self.store.path().display(), "action.init.ready");
                Ok(())
            }
            Err(e) => Err(self.reject_init(e)),
        }
    }

    /// Mark an init as failed. Also used for init messages refused before
    /// they reach the controller, so readiness never outlives a bad init.
    pub fn reject_init(&mut self, err: ActionError) -> ActionError {
        self.state = LifecycleState::Failed;
        self.last_failure = Some(err.to_string());
        tracing::warn!(code = %err.code(), error = %err, "action.init.failed");
        err
    }

    async fn try_initialize(
        &mut self,
        payload: ArtifactPayload,
        env: EnvironmentBindings,
    ) -> Result<(), ActionError> {
        let skip_verify = match payload {
            ArtifactPayload::Source(text) => {
                self.artifact = Some(self.store.install_source(&text).await?);
                false
            }
            ArtifactPayload::Binary(encoded) => {
                self.artifact = Some(self.store.install_binary(&encoded).await?);
                false
            }
            ArtifactPayload::PreExisting => {
                if !self.store.already_installed().await {
                    return Err(ActionError::NoArtifact);
                }
                self.artifact = None;
                true
            }
        };

        // Full replacement, never a merge with the previous init's set.
        self.env = env;

        if skip_verify {
            tracing::info!("action.init.pre_existing");
            return Ok(());
        }

        let inv = self
            .invoker
            .invoke(Phase::Init, &[self.verify_arg.as_str()], b"", &self.env)
            .await?;
        if !inv.success() {
            return Err(ActionError::VerificationFailed {
                exit_code: inv.exit_code,
                stderr: inv.stderr.lossy(),
            });
        }
        Ok(())
    }

    /// Feed `input` (a JSON document, as received) to the artifact and
    /// interpret what comes back.
    pub async fn run(&self, input: &[u8]) -> Result<Box<RawValue>, ActionError> {
        if !self.is_ready() {
            return Err(ActionError::NotReady);
        }

        tracing::debug!(bytes = input.len(), "action.run.start");
        let inv = self.invoker.invoke(Phase::Run, &[], input, &self.env).await?;
        tracing::info!(
            exit_code = ?inv.exit_code,
            stdout_bytes = inv.stdout.bytes.len(),
            stderr_bytes = inv.stderr.bytes.len(),
            elapsed_ms = inv.elapsed.as_millis() as u64,
            "action.run.done"
        );

        outcome::interpret_run(&inv, self.exit_policy, self.output_limit)
    }
}

fn payload_label(p: &ArtifactPayload) -> &'static str {
    match p {
        ArtifactPayload::Source(_) => "source",
        ArtifactPayload::Binary(_) => "binary",
        ArtifactPayload::PreExisting => "pre_existing",
    }
}
