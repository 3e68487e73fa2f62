// ── Lock manager ──
//
// Config and commit locks for every lock target of a scope. Acquisition
// goes target by target, config before commit; release is the exact
// reverse. A `ScopeLock` guard owns the handles: `release()` is idempotent,
// and a guard dropped without it schedules a release on the runtime.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use polsync_api::{Location, LockKind, LockOutcome};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{DeploymentScope, location_label};
use crate::session::DeviceSession;

const LOCK_ORDER: [LockKind; 2] = [LockKind::Config, LockKind::Commit];

/// One lock this process holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockHandle {
    pub target: Location,
    pub kind: LockKind,
    pub acquired_at: DateTime<Utc>,
}

type HeldLocks = Arc<DashMap<(Location, LockKind), DateTime<Utc>>>;

/// Acquires scope locks through a session, refusing to take a lock this
/// process already holds.
pub struct LockManager<S> {
    session: Arc<S>,
    held: HeldLocks,
    timeout: Duration,
}

impl<S: DeviceSession + 'static> LockManager<S> {
    pub fn new(session: Arc<S>, timeout: Duration) -> Self {
        Self {
            session,
            held: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Whether this process currently holds `kind` on `target`.
    pub fn is_held(&self, target: &Location, kind: LockKind) -> bool {
        self.held.contains_key(&(target.clone(), kind))
    }

    /// Take every lock of `scope`, or none of them.
    ///
    /// On failure, locks taken during this call are released (in reverse)
    /// before the error is returned.
    pub async fn acquire(
        &self,
        scope: &DeploymentScope,
        comment: &str,
    ) -> Result<ScopeLock<S>, CoreError> {
        let mut guard = ScopeLock {
            session: Arc::clone(&self.session),
            held: Arc::clone(&self.held),
            timeout: self.timeout,
            handles: Vec::new(),
        };

        for target in scope.lock_targets() {
            for kind in LOCK_ORDER {
                match self.acquire_one(&target, kind, comment).await {
                    Ok(handle) => guard.handles.push(handle),
                    Err(err) => {
                        warn!(
                            target = %location_label(&target),
                            kind = kind.as_str(),
                            error = %err,
                            "lock acquisition failed, releasing partial locks"
                        );
                        if let Err(release_err) = guard.release().await {
                            warn!(error = %release_err, "releasing partial locks failed");
                        }
                        return Err(err);
                    }
                }
            }
        }

        info!(scope = %scope, locks = guard.handles.len(), "scope locked");
        Ok(guard)
    }

    async fn acquire_one(
        &self,
        target: &Location,
        kind: LockKind,
        comment: &str,
    ) -> Result<LockHandle, CoreError> {
        let key = (target.clone(), kind);
        // Reserve the slot before the remote call so a concurrent run in
        // this process cannot pass the same check.
        match self.held.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(CoreError::LockConflict {
                    target: location_label(target),
                    kind,
                    holder: None,
                    message: "another run in this process holds it".into(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
            }
        }

        let outcome = match bounded(
            self.timeout,
            self.session.acquire_lock(target, kind, comment),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                self.held.remove(&key);
                return Err(err);
            }
        };
        if outcome == LockOutcome::AlreadyOwned {
            debug!(target = %location_label(target), kind = kind.as_str(), "lock already owned by this session");
        }

        let acquired_at = Utc::now();
        self.held.insert(key, acquired_at);
        Ok(LockHandle {
            target: target.clone(),
            kind,
            acquired_at,
        })
    }
}

/// Guard over the locks of one scope.
pub struct ScopeLock<S: DeviceSession + 'static> {
    session: Arc<S>,
    held: HeldLocks,
    timeout: Duration,
    handles: Vec<LockHandle>,
}

impl<S: DeviceSession + 'static> std::fmt::Debug for ScopeLock<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeLock")
            .field("timeout", &self.timeout)
            .field("handles", &self.handles)
            .finish_non_exhaustive()
    }
}

impl<S: DeviceSession + 'static> ScopeLock<S> {
    /// Locks still held, in acquisition order.
    pub fn handles(&self) -> &[LockHandle] {
        &self.handles
    }

    /// Release every lock in reverse acquisition order.
    ///
    /// Each handle is released exactly once; a failed release is not
    /// retried. All releases are attempted and the first error is returned.
    /// Calling this again is a no-op.
    pub async fn release(&mut self) -> Result<(), CoreError> {
        let handles = std::mem::take(&mut self.handles);
        release_all(&*self.session, &self.held, self.timeout, handles).await
    }
}

impl<S: DeviceSession + 'static> Drop for ScopeLock<S> {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        let handles = std::mem::take(&mut self.handles);
        warn!(locks = handles.len(), "scope lock dropped without release");

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let session = Arc::clone(&self.session);
                let held = Arc::clone(&self.held);
                let timeout = self.timeout;
                runtime.spawn(async move {
                    if let Err(err) = release_all(&*session, &held, timeout, handles).await {
                        warn!(error = %err, "background lock release failed");
                    }
                });
            }
            Err(_) => {
                for handle in handles {
                    warn!(
                        target = %location_label(&handle.target),
                        kind = handle.kind.as_str(),
                        "no runtime to release lock; it stays held on the device"
                    );
                    self.held.remove(&(handle.target, handle.kind));
                }
            }
        }
    }
}

async fn release_all<S: DeviceSession>(
    session: &S,
    held: &HeldLocks,
    timeout: Duration,
    handles: Vec<LockHandle>,
) -> Result<(), CoreError> {
    let mut first_error = None;
    for handle in handles.into_iter().rev() {
        let released = bounded(timeout, session.release_lock(&handle.target, handle.kind)).await;
        held.remove(&(handle.target.clone(), handle.kind));
        match released {
            Ok(()) => debug!(
                target = %location_label(&handle.target),
                kind = handle.kind.as_str(),
                "lock released"
            ),
            Err(err) => {
                warn!(
                    target = %location_label(&handle.target),
                    kind = handle.kind.as_str(),
                    error = %err,
                    "lock release failed"
                );
                first_error.get_or_insert(err);
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Bound a remote call; a timeout is a connectivity failure.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    call: impl std::future::Future<Output = Result<T, CoreError>>,
) -> Result<T, CoreError> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| {
            Err(CoreError::Connectivity {
                message: format!("request timed out after {}s", timeout.as_secs()),
            })
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::memory::{MemoryDevice, TraceEvent};

    fn manager(device: &Arc<MemoryDevice>) -> LockManager<MemoryDevice> {
        LockManager::new(Arc::clone(device), Duration::from_secs(5))
    }

    fn lock_events(device: &MemoryDevice) -> Vec<(bool, String, LockKind)> {
        device
            .trace()
            .into_iter()
            .filter_map(|e| match e {
                TraceEvent::Acquire { target, kind } => Some((true, target.name, kind)),
                TraceEvent::Release { target, kind } => Some((false, target.name, kind)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn acquires_in_order_and_releases_in_reverse() {
        let device = Arc::new(MemoryDevice::new());
        let scope = DeploymentScope::panorama("branches", Some("branch-tpl".into()));
        let mut lock = manager(&device).acquire(&scope, "test").await.unwrap();
        assert_eq!(lock.handles().len(), 4);
        lock.release().await.unwrap();
        lock.release().await.unwrap();

        assert_eq!(
            lock_events(&device),
            vec![
                (true, "branch-tpl".into(), LockKind::Config),
                (true, "branch-tpl".into(), LockKind::Commit),
                (true, "branches".into(), LockKind::Config),
                (true, "branches".into(), LockKind::Commit),
                (false, "branches".into(), LockKind::Commit),
                (false, "branches".into(), LockKind::Config),
                (false, "branch-tpl".into(), LockKind::Commit),
                (false, "branch-tpl".into(), LockKind::Config),
            ]
        );
        assert!(device.held_locks().is_empty());
    }

    #[tokio::test]
    async fn conflict_releases_partial_locks() {
        let device = Arc::new(MemoryDevice::new());
        let scope = DeploymentScope::firewall("vsys1");
        device.hold_lock(&scope.container(), LockKind::Commit, "admin2");

        let err = manager(&device).acquire(&scope, "test").await.unwrap_err();
        match err {
            CoreError::LockConflict { holder, kind, .. } => {
                assert_eq!(holder.as_deref(), Some("admin2"));
                assert_eq!(kind, LockKind::Commit);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            lock_events(&device),
            vec![
                (true, "vsys1".into(), LockKind::Config),
                (true, "vsys1".into(), LockKind::Commit),
                (false, "vsys1".into(), LockKind::Config),
            ]
        );
        // Only the other administrator's lock remains.
        assert_eq!(device.held_locks().len(), 1);
    }

    #[tokio::test]
    async fn second_acquire_in_process_conflicts() {
        let device = Arc::new(MemoryDevice::new());
        let scope = DeploymentScope::firewall("vsys1");
        let manager = manager(&device);
        let mut first = manager.acquire(&scope, "one").await.unwrap();

        let err = manager.acquire(&scope, "two").await.unwrap_err();
        assert!(matches!(err, CoreError::LockConflict { holder: None, .. }));
        assert!(manager.is_held(&scope.container(), LockKind::Config));

        first.release().await.unwrap();
        assert!(!manager.is_held(&scope.container(), LockKind::Config));
    }

    /// Yields before every lock call so concurrent acquisitions interleave.
    struct Yielding(MemoryDevice);

    impl DeviceSession for Yielding {
        async fn list_objects(
            &self,
            container: &Location,
            kind: crate::model::ObjectKind,
        ) -> Result<Vec<crate::model::LiveObject>, CoreError> {
            self.0.list_objects(container, kind).await
        }

        async fn acquire_lock(
            &self,
            target: &Location,
            kind: LockKind,
            comment: &str,
        ) -> Result<LockOutcome, CoreError> {
            tokio::task::yield_now().await;
            self.0.acquire_lock(target, kind, comment).await
        }

        async fn release_lock(&self, target: &Location, kind: LockKind) -> Result<(), CoreError> {
            tokio::task::yield_now().await;
            self.0.release_lock(target, kind).await
        }

        async fn submit_batch(
            &self,
            container: &Location,
            operations: &[crate::batch::BatchOperation],
            atomic: bool,
        ) -> Result<Vec<crate::batch::BatchResult>, CoreError> {
            self.0.submit_batch(container, operations, atomic).await
        }
    }

    #[tokio::test]
    async fn concurrent_acquires_admit_one_writer() {
        let session = Arc::new(Yielding(MemoryDevice::new()));
        let scope = DeploymentScope::firewall("vsys1");
        let manager = LockManager::new(Arc::clone(&session), Duration::from_secs(5));

        let (first, second) = tokio::join!(manager.acquire(&scope, "one"), manager.acquire(&scope, "two"));
        let (mut winner, err) = match (first, second) {
            (Ok(lock), Err(err)) | (Err(err), Ok(lock)) => (lock, err),
            (first, second) => panic!(
                "expected exactly one writer, got first ok={} second ok={}",
                first.is_ok(),
                second.is_ok()
            ),
        };
        assert!(matches!(err, CoreError::LockConflict { holder: None, .. }));
        assert_eq!(winner.handles().len(), 2);
        assert!(manager.is_held(&scope.container(), LockKind::Config));
        assert!(manager.is_held(&scope.container(), LockKind::Commit));

        winner.release().await.unwrap();
        assert!(!manager.is_held(&scope.container(), LockKind::Config));
        assert!(session.0.held_locks().is_empty());
    }

    #[tokio::test]
    async fn failed_acquire_frees_the_reservation() {
        let device = Arc::new(MemoryDevice::new());
        let scope = DeploymentScope::firewall("vsys1");
        device.fail_acquire(&scope.container(), LockKind::Config);
        let manager = manager(&device);

        assert!(manager.acquire(&scope, "test").await.is_err());
        assert!(!manager.is_held(&scope.container(), LockKind::Config));
    }

    #[tokio::test]
    async fn release_failure_is_reported_but_all_are_attempted() {
        let device = Arc::new(MemoryDevice::new());
        let scope = DeploymentScope::firewall("vsys1");
        device.fail_release(&scope.container(), LockKind::Commit);
        let mut lock = manager(&device).acquire(&scope, "test").await.unwrap();

        assert!(lock.release().await.is_err());
        let releases = lock_events(&device).into_iter().filter(|e| !e.0).count();
        assert_eq!(releases, 2);
    }

    #[tokio::test]
    async fn dropped_guard_releases_in_background() {
        let device = Arc::new(MemoryDevice::new());
        let scope = DeploymentScope::firewall("vsys1");
        let lock = manager(&device).acquire(&scope, "test").await.unwrap();
        drop(lock);

        for _ in 0..10 {
            if device.held_locks().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(device.held_locks().is_empty());
    }
}
