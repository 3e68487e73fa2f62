//! Reconciliation engine between a declarative desired state and a live
//! firewall or Panorama configuration.
//!
//! A run moves through fixed stages, each owned by one module:
//!
//! - **[`DesiredStateBuilder`]** - turns declarative records into a
//!   cross-referenced object graph for one [`DeploymentScope`]. Pure; fails
//!   on unresolved references and conflicting duplicates before the device
//!   is contacted.
//!
//! - **[`Inspector`]** - lists live objects per kind, concurrently and with
//!   per-call timeouts, into a [`LiveState`].
//!
//! - **[`compute_deltas`]** / **[`sequence`]** - per-kind create/update/delete
//!   partitions, dangling-reference protection, and an ordered
//!   [`ExecutionPlan`] (members before containers, deletes reversed).
//!
//! - **[`LockManager`]** - config and commit locks with guaranteed release
//!   through the [`ScopeLock`] guard.
//!
//! - **[`BatchExecutor`]** - splits steps into physical requests and maps
//!   every operation to exactly one [`BatchResult`].
//!
//! - **[`Orchestrator`]** - drives the stages and produces a
//!   [`DeploymentReport`].
//!
//! All device access goes through the [`DeviceSession`] trait:
//! [`RemoteSession`] speaks the JSON API, [`MemoryDevice`] keeps state in
//! process.

pub mod batch;
pub mod config;
mod convert;
pub mod delta;
pub mod desired;
pub mod error;
pub mod inspector;
pub mod lock;
pub mod memory;
pub mod model;
pub mod orchestrator;
pub mod remote;
pub mod report;
pub mod sequencer;
pub mod session;

// ── Primary re-exports ──────────────────────────────────────────────
pub use batch::{BatchExecutor, BatchOperation, BatchOutcome, BatchResult, StepOutcome, Verb};
pub use config::{
    BatchMode, DanglingPolicy, DeviceConfig, EngineConfig, FailurePolicy, RetryPolicy,
    TlsVerification,
};
pub use delta::{Dangling, Delta, DeltaSet, Update, compute_deltas};
pub use desired::{DesiredState, DesiredStateBuilder, RecordPosition, SourceRecord};
pub use error::CoreError;
pub use inspector::{Inspector, LiveState};
pub use lock::{LockHandle, LockManager, ScopeLock};
pub use memory::{MemoryDevice, TraceEvent};
pub use orchestrator::{Orchestrator, plan_changes};
pub use remote::RemoteSession;
pub use report::{
    CreatedEntry, DeploymentError, DeploymentReport, FailureEntry, KindCounts, Phase,
    PhaseRecord, PhaseStatus, RunOutcome,
};
pub use sequencer::{ExecutionPlan, Step, sequence};
pub use session::DeviceSession;

pub use model::{
    Attributes, DeploymentScope, LiveObject, ObjectDefinition, ObjectKind, ObjectRef,
    PredefinedCatalog,
};

// Lock and location types come from the wire layer unchanged.
pub use polsync_api::{Credentials, Location, LocationType, LockKind, LockOutcome};
pub use tokio_util::sync::CancellationToken;
