// ── Device session seam ──
//
// Every component that talks to the device receives a session handle
// explicitly. `RemoteSession` speaks HTTP; `MemoryDevice` keeps state in
// process for tests and dry runs.

use std::future::Future;

use polsync_api::{Location, LockKind, LockOutcome};

use crate::batch::{BatchOperation, BatchResult};
use crate::error::CoreError;
use crate::model::{LiveObject, ObjectKind};

/// The three capabilities the engine needs from a device.
///
/// Implementations must be safe to share across concurrent discovery
/// tasks; writes are always issued sequentially by the engine.
pub trait DeviceSession: Send + Sync {
    /// Every object of `kind` defined in `container`.
    ///
    /// Returned objects carry canonical attributes; dependency sets are
    /// left empty and filled in by the inspector.
    fn list_objects(
        &self,
        container: &Location,
        kind: ObjectKind,
    ) -> impl Future<Output = Result<Vec<LiveObject>, CoreError>> + Send;

    /// Take one lock. A lock held by someone else is `LockConflict`.
    fn acquire_lock(
        &self,
        target: &Location,
        kind: LockKind,
        comment: &str,
    ) -> impl Future<Output = Result<LockOutcome, CoreError>> + Send;

    /// Release one lock. Releasing a lock that is not held succeeds.
    fn release_lock(
        &self,
        target: &Location,
        kind: LockKind,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Submit one physical batch and report one result per operation, in
    /// input order.
    ///
    /// With `atomic` set either every operation applies or none does.
    fn submit_batch(
        &self,
        container: &Location,
        operations: &[BatchOperation],
        atomic: bool,
    ) -> impl Future<Output = Result<Vec<BatchResult>, CoreError>> + Send;
}
