// ── Delta calculator ──
//
// Compares desired and live objects kind by kind. Deletions that would
// leave a surviving object pointing at nothing are withheld (or abort
// planning, depending on `DanglingPolicy`).

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{DanglingPolicy, EngineConfig};
use crate::desired::DesiredState;
use crate::error::CoreError;
use crate::inspector::LiveState;
use crate::model::{LiveObject, ObjectDefinition, ObjectKind, ObjectRef, dependencies};

/// A changed object and the live version it replaces.
#[derive(Debug, Clone, Serialize)]
pub struct Update {
    pub desired: ObjectDefinition,
    pub previous: LiveObject,
}

/// Difference between desired and live objects of one kind.
///
/// No object appears in more than one partition, and nothing in
/// `to_delete` is referenced by an object that survives the run.
#[derive(Debug, Clone, Serialize)]
pub struct Delta {
    pub kind: ObjectKind,
    pub to_create: Vec<ObjectDefinition>,
    pub to_update: Vec<Update>,
    pub to_delete: Vec<LiveObject>,
}

impl Delta {
    fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len()
    }

    pub fn deleted_refs(&self) -> impl Iterator<Item = &ObjectRef> {
        self.to_delete.iter().map(LiveObject::reference)
    }
}

/// A deletion that was withheld because surviving objects still use it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dangling {
    pub object: ObjectRef,
    pub referenced_by: Vec<ObjectRef>,
}

impl Dangling {
    pub fn to_error(&self) -> CoreError {
        CoreError::DanglingReference {
            object: self.object.clone(),
            referenced_by: self.referenced_by.clone(),
        }
    }
}

/// Deltas for every managed kind, in creation order, plus withheld deletions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeltaSet {
    pub deltas: Vec<Delta>,
    pub dangling: Vec<Dangling>,
}

impl DeltaSet {
    pub fn is_empty(&self) -> bool {
        self.deltas.iter().all(Delta::is_empty)
    }

    pub fn get(&self, kind: ObjectKind) -> Option<&Delta> {
        self.deltas.iter().find(|d| d.kind == kind)
    }
}

/// Partition desired vs. live for every managed kind.
///
/// Every managed kind must have been inspected; an uninspected kind is an
/// internal error rather than "nothing exists".
pub fn compute_deltas(
    desired: &DesiredState,
    live: &LiveState,
    config: &EngineConfig,
) -> Result<DeltaSet, CoreError> {
    let mut deltas = Vec::new();
    let mut candidates: BTreeMap<ObjectRef, LiveObject> = BTreeMap::new();

    for kind in ObjectKind::all() {
        if !config.is_managed(kind) {
            continue;
        }
        let live_objects = live.objects_of(kind).ok_or_else(|| {
            CoreError::Internal(format!("live state for {kind} was not inspected"))
        })?;
        let empty = BTreeMap::new();
        let desired_objects = desired.objects_of(kind).unwrap_or(&empty);

        let mut delta = Delta::new(kind);
        for (name, definition) in desired_objects {
            match live_objects.get(name) {
                None => delta.to_create.push(definition.clone()),
                Some(previous) if !definition.same_attributes(&previous.definition) => {
                    delta.to_update.push(Update {
                        desired: definition.clone(),
                        previous: previous.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        if config.prunes(kind) {
            for (name, object) in live_objects {
                if !desired_objects.contains_key(name) {
                    candidates.insert(object.reference().clone(), object.clone());
                }
            }
        }
        deltas.push(delta);
    }

    let desired_edges = desired_edges(desired, live, config);
    let dangling = withhold_dangling(&desired_edges, live, &mut candidates);
    if let Some(first) = dangling.first() {
        if config.dangling_policy == DanglingPolicy::Abort {
            return Err(first.to_error());
        }
    }
    for entry in &dangling {
        warn!(
            object = %entry.object,
            referenced_by = ?entry.referenced_by.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "withholding deletion of a referenced object"
        );
    }

    for delta in &mut deltas {
        let kind = delta.kind;
        delta.to_delete = candidates
            .range(ObjectRef::new(kind, "")..)
            .take_while(|(reference, _)| reference.kind == kind)
            .map(|(_, object)| object.clone())
            .collect();
        debug!(
            %kind,
            create = delta.to_create.len(),
            update = delta.to_update.len(),
            delete = delta.to_delete.len(),
            "delta computed"
        );
    }

    Ok(DeltaSet { deltas, dangling })
}

/// Remove deletion candidates that a survivor still references, repeating
/// until stable: a withheld object survives, so its own references must be
/// kept as well.
fn withhold_dangling(
    desired: &BTreeMap<ObjectRef, BTreeSet<ObjectRef>>,
    live: &LiveState,
    candidates: &mut BTreeMap<ObjectRef, LiveObject>,
) -> Vec<Dangling> {
    let mut dangling: Vec<Dangling> = Vec::new();
    loop {
        let mut users: BTreeMap<ObjectRef, BTreeSet<ObjectRef>> = BTreeMap::new();
        for (owner, deps) in survivor_edges(desired, live, candidates) {
            for dep in deps.iter().filter(|dep| candidates.contains_key(*dep)) {
                users.entry(dep.clone()).or_default().insert(owner.clone());
            }
        }
        if users.is_empty() {
            break;
        }
        for (object, referenced_by) in users {
            candidates.remove(&object);
            dangling.push(Dangling {
                object,
                referenced_by: referenced_by.into_iter().collect(),
            });
        }
    }
    dangling.sort_by(|a, b| a.object.cmp(&b.object));
    dangling
}

/// Dependency sets of desired objects, re-resolved against desired and live
/// names together. The builder only sees desired names, so a name the open
/// catalog tolerated may still be a live object that must not be deleted.
fn desired_edges(
    desired: &DesiredState,
    live: &LiveState,
    config: &EngineConfig,
) -> BTreeMap<ObjectRef, BTreeSet<ObjectRef>> {
    desired
        .iter()
        .map(|definition| {
            let (live_deps, _) = dependencies(&definition.attributes, &config.catalog, |r| {
                desired.contains(r) || live.get(r).is_some()
            });
            let mut deps = definition.dependencies.clone();
            deps.extend(live_deps);
            (definition.reference.clone(), deps)
        })
        .collect()
}

/// Dependency sets of every object that survives the run: desired objects
/// (their desired references win over the live ones they replace) and live
/// objects that are neither desired nor scheduled for deletion.
fn survivor_edges<'a>(
    desired: &'a BTreeMap<ObjectRef, BTreeSet<ObjectRef>>,
    live: &'a LiveState,
    candidates: &'a BTreeMap<ObjectRef, LiveObject>,
) -> impl Iterator<Item = (&'a ObjectRef, &'a BTreeSet<ObjectRef>)> {
    let kept_live = live
        .iter()
        .filter(|o| !desired.contains_key(o.reference()) && !candidates.contains_key(o.reference()))
        .map(|o| (o.reference(), &o.definition.dependencies));
    desired.iter().chain(kept_live)
}
