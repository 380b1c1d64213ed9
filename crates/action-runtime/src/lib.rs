//! `action-runtime` — everything behind the action proxy's HTTP surface.
//!
//! ```text
//!   ArtifactStore ──> ProcessInvoker ──> LifecycleController
//!   (fixed slot)      (spawn/pipe/wait)   (Uninitialized → Initializing → Ready | Failed)
//! ```
//!
//! No process-wide state: a [`LifecycleController`] is built from a
//! [`RuntimeConfig`] and owns its slot, bindings and readiness. Environment
//! bindings are handed to each child rather than written into this process's
//! environment, so several controllers can coexist in one test binary.

pub mod artifact;
pub mod config;
pub mod errors;
pub mod invoker;
pub mod lifecycle;
pub mod outcome;

pub use artifact::{ActionArtifact, ArtifactKind, ArtifactPayload, ArtifactStore, EnvironmentBindings};
pub use config::{ConfigError, ExitPolicy, RuntimeConfig};
pub use errors::{ActionError, ErrorCode, Phase};
pub use invoker::{Captured, Invocation, ProcessInvoker};
pub use lifecycle::{LifecycleController, LifecycleState};
