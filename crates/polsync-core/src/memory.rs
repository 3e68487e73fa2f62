// ── In-memory device ──
//
// A `DeviceSession` that keeps objects and locks in process. It enforces the
// same rules a real device does (no duplicate creates, no updates to missing
// objects, no deleting referenced objects, references must exist) and
// records every call so tests can assert on ordering and lock pairing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use polsync_api::{Location, LockKind, LockOutcome};

use crate::batch::{BatchOperation, BatchResult, Verb};
use crate::error::CoreError;
use crate::model::{
    Attributes, LiveObject, ObjectDefinition, ObjectKind, ObjectRef, PredefinedCatalog,
    dependencies, location_label,
};
use crate::session::DeviceSession;

/// One observed call or applied change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    List {
        container: Location,
        kind: ObjectKind,
    },
    Acquire {
        target: Location,
        kind: LockKind,
    },
    Release {
        target: Location,
        kind: LockKind,
    },
    Submit {
        operations: Vec<(Verb, ObjectRef)>,
        atomic: bool,
    },
    /// An operation that took effect (after any rollback).
    Applied {
        verb: Verb,
        object: ObjectRef,
    },
}

#[derive(Debug, Clone)]
struct StoredObject {
    attributes: Attributes,
    device_id: String,
}

type Store = BTreeMap<ObjectRef, StoredObject>;

#[derive(Default)]
struct State {
    objects: HashMap<Location, Store>,
    locks: HashMap<(Location, LockKind), String>,
    trace: Vec<TraceEvent>,
    failing_ops: HashMap<(Verb, ObjectRef), String>,
    failing_lists: HashMap<ObjectKind, u32>,
    failing_acquires: HashSet<(Location, LockKind)>,
    failing_releases: HashSet<(Location, LockKind)>,
    disconnect_after: Option<usize>,
    submits: usize,
    next_id: u64,
}

/// In-process stand-in for a device.
pub struct MemoryDevice {
    state: Mutex<State>,
    catalog: PredefinedCatalog,
    holder: String,
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            catalog: PredefinedCatalog::default(),
            holder: "polsync".into(),
        }
    }

    pub fn with_catalog(mut self, catalog: PredefinedCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding and inspection ───────────────────────────────────────

    /// Place an object on the device as if someone else had created it.
    pub fn seed(&self, container: &Location, kind: ObjectKind, name: &str, attributes: Attributes) {
        let mut state = self.state();
        state.next_id += 1;
        let device_id = format!("mem-{}", state.next_id);
        state.objects.entry(container.clone()).or_default().insert(
            ObjectRef::new(kind, name),
            StoredObject {
                attributes: attributes.canonicalize(),
                device_id,
            },
        );
    }

    /// Current objects in `container`, sorted by kind then name.
    pub fn objects(&self, container: &Location) -> Vec<ObjectDefinition> {
        self.state()
            .objects
            .get(container)
            .map(|store| {
                store
                    .iter()
                    .map(|(reference, stored)| ObjectDefinition {
                        reference: reference.clone(),
                        attributes: stored.attributes.clone(),
                        dependencies: Default::default(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, container: &Location, object: &ObjectRef) -> bool {
        self.state()
            .objects
            .get(container)
            .is_some_and(|store| store.contains_key(object))
    }

    pub fn trace(&self) -> Vec<TraceEvent> {
        self.state().trace.clone()
    }

    pub fn clear_trace(&self) {
        self.state().trace.clear();
    }

    /// Locks currently held, with their holder.
    pub fn held_locks(&self) -> Vec<(Location, LockKind, String)> {
        let mut held: Vec<_> = self
            .state()
            .locks
            .iter()
            .map(|((target, kind), holder)| (target.clone(), *kind, holder.clone()))
            .collect();
        held.sort_by(|a, b| (&a.0.name, a.1).cmp(&(&b.0.name, b.1)));
        held
    }

    // ── Failure injection ────────────────────────────────────────────

    /// Make one operation fail whenever it is submitted.
    pub fn fail_operation(&self, verb: Verb, object: ObjectRef, message: &str) {
        self.state()
            .failing_ops
            .insert((verb, object), message.to_owned());
    }

    /// Fail the next `times` listings of `kind` with a connectivity error.
    pub fn fail_listing(&self, kind: ObjectKind, times: u32) {
        self.state().failing_lists.insert(kind, times);
    }

    /// Pretend another administrator holds a lock.
    pub fn hold_lock(&self, target: &Location, kind: LockKind, holder: &str) {
        self.state()
            .locks
            .insert((target.clone(), kind), holder.to_owned());
    }

    /// Fail every acquisition of this lock with a connectivity error.
    pub fn fail_acquire(&self, target: &Location, kind: LockKind) {
        self.state().failing_acquires.insert((target.clone(), kind));
    }

    /// Fail every release of this lock with a connectivity error.
    pub fn fail_release(&self, target: &Location, kind: LockKind) {
        self.state().failing_releases.insert((target.clone(), kind));
    }

    /// Drop the connection after `submits` successful batch requests.
    pub fn disconnect_after(&self, submits: usize) {
        self.state().disconnect_after = Some(submits);
    }

    // ── Operation semantics ──────────────────────────────────────────

    fn check_references(&self, store: &Store, object: &ObjectRef, attributes: &Attributes) -> Result<(), String> {
        let (_, unresolved) = dependencies(attributes, &self.catalog, |r| store.contains_key(r));
        match unresolved.first() {
            Some((field, name)) => Err(format!("{object}: {field} references missing object `{name}`")),
            None => Ok(()),
        }
    }

    fn apply(
        &self,
        store: &mut Store,
        next_id: &mut u64,
        failing: &HashMap<(Verb, ObjectRef), String>,
        op: &BatchOperation,
    ) -> Result<Option<String>, String> {
        if let Some(message) = failing.get(&(op.verb, op.object.clone())) {
            return Err(message.clone());
        }
        let object = &op.object;
        match op.verb {
            Verb::Create | Verb::Update => {
                let attributes = op
                    .payload
                    .clone()
                    .ok_or_else(|| format!("{object}: missing payload"))?;
                self.check_references(store, object, &attributes)?;
                if op.verb == Verb::Create {
                    if store.contains_key(object) {
                        return Err(format!("{object} already exists"));
                    }
                    *next_id += 1;
                    let device_id = format!("mem-{next_id}");
                    store.insert(
                        object.clone(),
                        StoredObject {
                            attributes,
                            device_id: device_id.clone(),
                        },
                    );
                    Ok(Some(device_id))
                } else {
                    let stored = store
                        .get_mut(object)
                        .ok_or_else(|| format!("{object} does not exist"))?;
                    stored.attributes = attributes;
                    Ok(None)
                }
            }
            Verb::Delete => {
                if !store.contains_key(object) {
                    return Err(format!("{object} does not exist"));
                }
                let referrer = store.iter().find(|(other, stored)| {
                    *other != object
                        && dependencies(&stored.attributes, &self.catalog, |r| store.contains_key(r))
                            .0
                            .contains(object)
                });
                if let Some((other, _)) = referrer {
                    return Err(format!("{object} is referenced by {other}"));
                }
                store.remove(object);
                Ok(None)
            }
        }
    }
}

fn connectivity(message: String) -> CoreError {
    CoreError::Connectivity { message }
}

impl DeviceSession for MemoryDevice {
    async fn list_objects(
        &self,
        container: &Location,
        kind: ObjectKind,
    ) -> Result<Vec<LiveObject>, CoreError> {
        let mut state = self.state();
        state.trace.push(TraceEvent::List {
            container: container.clone(),
            kind,
        });
        if let Some(remaining) = state.failing_lists.get_mut(&kind) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(connectivity(format!("listing {kind} failed")));
            }
        }
        Ok(state
            .objects
            .get(container)
            .map(|store| {
                store
                    .iter()
                    .filter(|(reference, _)| reference.kind == kind)
                    .map(|(reference, stored)| LiveObject {
                        definition: ObjectDefinition {
                            reference: reference.clone(),
                            attributes: stored.attributes.clone(),
                            dependencies: Default::default(),
                        },
                        device_id: Some(stored.device_id.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn acquire_lock(
        &self,
        target: &Location,
        kind: LockKind,
        _comment: &str,
    ) -> Result<LockOutcome, CoreError> {
        let mut state = self.state();
        state.trace.push(TraceEvent::Acquire {
            target: target.clone(),
            kind,
        });
        let key = (target.clone(), kind);
        if state.failing_acquires.contains(&key) {
            return Err(connectivity(format!("acquiring {} lock failed", kind.as_str())));
        }
        match state.locks.get(&key) {
            Some(holder) if *holder == self.holder => Ok(LockOutcome::AlreadyOwned),
            Some(holder) => Err(CoreError::LockConflict {
                target: location_label(target),
                kind,
                holder: Some(holder.clone()),
                message: format!("{} lock is held by {holder}", kind.as_str()),
            }),
            None => {
                state.locks.insert(key, self.holder.clone());
                Ok(LockOutcome::Acquired)
            }
        }
    }

    async fn release_lock(&self, target: &Location, kind: LockKind) -> Result<(), CoreError> {
        let mut state = self.state();
        state.trace.push(TraceEvent::Release {
            target: target.clone(),
            kind,
        });
        let key = (target.clone(), kind);
        if state.failing_releases.contains(&key) {
            return Err(connectivity(format!("releasing {} lock failed", kind.as_str())));
        }
        if state.locks.get(&key).is_some_and(|h| *h == self.holder) {
            state.locks.remove(&key);
        }
        Ok(())
    }

    async fn submit_batch(
        &self,
        container: &Location,
        operations: &[BatchOperation],
        atomic: bool,
    ) -> Result<Vec<BatchResult>, CoreError> {
        let mut guard = self.state();
        let state = &mut *guard;
        state.trace.push(TraceEvent::Submit {
            operations: operations
                .iter()
                .map(|op| (op.verb, op.object.clone()))
                .collect(),
            atomic,
        });
        if state.disconnect_after.is_some_and(|n| state.submits >= n) {
            return Err(connectivity("connection reset during batch".into()));
        }
        state.submits += 1;

        let mut working = state.objects.get(container).cloned().unwrap_or_default();
        let mut next_id = state.next_id;
        let mut results = Vec::with_capacity(operations.len());
        let mut failed_at = None;

        for (index, op) in operations.iter().enumerate() {
            match self.apply(&mut working, &mut next_id, &state.failing_ops, op) {
                Ok(device_id) => results.push(BatchResult::ok(op.sequence_id, device_id)),
                Err(message) => {
                    results.push(BatchResult::failed(op.sequence_id, message));
                    failed_at = Some(index);
                    break;
                }
            }
        }
        results.extend(
            operations
                .iter()
                .skip(results.len())
                .map(|op| BatchResult::not_attempted(op.sequence_id)),
        );

        let committed = match failed_at {
            Some(index) if atomic => {
                for result in results.iter_mut().take(index) {
                    *result = BatchResult::not_attempted(result.sequence_id);
                }
                0
            }
            Some(index) => index,
            None => operations.len(),
        };

        if committed > 0 {
            state.objects.insert(container.clone(), working);
            state.next_id = next_id;
            for op in operations.iter().take(committed) {
                state.trace.push(TraceEvent::Applied {
                    verb: op.verb,
                    object: op.object.clone(),
                });
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DeploymentScope;
    use serde_json::json;

    fn address(value: &str) -> Attributes {
        Attributes::from_value(ObjectKind::Address, json!({ "value": value })).unwrap()
    }

    fn op(seq: u32, verb: Verb, kind: ObjectKind, name: &str, payload: Option<Attributes>) -> BatchOperation {
        BatchOperation {
            sequence_id: seq,
            verb,
            object: ObjectRef::new(kind, name),
            payload: payload.map(Attributes::canonicalize),
            device_id: None,
        }
    }

    #[tokio::test]
    async fn refuses_to_delete_referenced_object() {
        let container = DeploymentScope::firewall("vsys1").container();
        let device = MemoryDevice::new();
        device.seed(&container, ObjectKind::Address, "A2", address("10.0.0.2"));
        device.seed(
            &container,
            ObjectKind::AddressGroup,
            "G1",
            Attributes::from_value(ObjectKind::AddressGroup, json!({ "static-members": ["A2"] }))
                .unwrap(),
        );

        let results = device
            .submit_batch(
                &container,
                &[op(0, Verb::Delete, ObjectKind::Address, "A2", None)],
                false,
            )
            .await
            .unwrap();
        assert_eq!(results[0].outcome, crate::batch::BatchOutcome::Failed);
        assert!(device.contains(&container, &ObjectRef::new(ObjectKind::Address, "A2")));
    }

    #[tokio::test]
    async fn create_requires_existing_references() {
        let container = DeploymentScope::firewall("vsys1").container();
        let device = MemoryDevice::new();
        let group =
            Attributes::from_value(ObjectKind::AddressGroup, json!({ "static-members": ["web-1"] }))
                .unwrap();

        let results = device
            .submit_batch(
                &container,
                &[
                    op(0, Verb::Create, ObjectKind::AddressGroup, "web", Some(group.clone())),
                ],
                false,
            )
            .await
            .unwrap();
        assert_eq!(results[0].outcome, crate::batch::BatchOutcome::Failed);

        let results = device
            .submit_batch(
                &container,
                &[
                    op(0, Verb::Create, ObjectKind::Address, "web-1", Some(address("10.0.0.1"))),
                    op(1, Verb::Create, ObjectKind::AddressGroup, "web", Some(group)),
                ],
                false,
            )
            .await
            .unwrap();
        assert!(results.iter().all(|r| r.outcome == crate::batch::BatchOutcome::Ok));
        assert!(results[0].device_id.is_some());
    }

    #[tokio::test]
    async fn lock_held_by_other_is_conflict() {
        let target = DeploymentScope::firewall("vsys1").container();
        let device = MemoryDevice::new();
        device.hold_lock(&target, LockKind::Config, "admin2");

        let err = device
            .acquire_lock(&target, LockKind::Config, "test")
            .await
            .unwrap_err();
        match err {
            CoreError::LockConflict { holder, .. } => assert_eq!(holder.as_deref(), Some("admin2")),
            other => panic!("expected LockConflict, got {other:?}"),
        }

        let outcome = device
            .acquire_lock(&target, LockKind::Commit, "test")
            .await
            .unwrap();
        assert_eq!(outcome, LockOutcome::Acquired);
        let again = device
            .acquire_lock(&target, LockKind::Commit, "test")
            .await
            .unwrap();
        assert_eq!(again, LockOutcome::AlreadyOwned);
    }
}
