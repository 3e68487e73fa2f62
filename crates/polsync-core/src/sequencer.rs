// ── Dependency sequencer ──
//
// Turns per-kind deltas into an ordered execution plan. Kinds follow the
// fixed creation order (reversed for deletion). Inside a self-referential
// kind, members are created before the groups that contain them and
// deleted after them; a containment cycle is fatal.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::batch::{BatchOperation, Verb};
use crate::delta::{Dangling, Delta, DeltaSet};
use crate::error::CoreError;
use crate::model::{LiveObject, ObjectDefinition, ObjectKind, ObjectRef};

/// Ordered operations for one kind in one pass.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub kind: ObjectKind,
    pub operations: Vec<BatchOperation>,
}

/// Everything a run will do, fully computed before the first write.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    /// Creates and updates, kinds in creation order.
    pub upserts: Vec<Step>,
    /// Deletes, kinds in reverse creation order.
    pub deletes: Vec<Step>,
    /// Deletions withheld because surviving objects reference them.
    pub dangling: Vec<Dangling>,
}

impl ExecutionPlan {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    /// Total operations across both passes.
    pub fn len(&self) -> usize {
        self.upserts
            .iter()
            .chain(&self.deletes)
            .map(|s| s.operations.len())
            .sum()
    }

    pub fn operations(&self) -> impl Iterator<Item = &BatchOperation> {
        self.upserts
            .iter()
            .chain(&self.deletes)
            .flat_map(|s| &s.operations)
    }
}

/// Order `deltas` into an execution plan.
pub fn sequence(deltas: &DeltaSet) -> Result<ExecutionPlan, CoreError> {
    let mut upserts = Vec::new();
    let mut deletes = Vec::new();

    for delta in &deltas.deltas {
        if let Some(step) = upsert_step(delta)? {
            upserts.push(step);
        }
        if let Some(step) = delete_step(delta)? {
            deletes.push(step);
        }
    }
    deletes.reverse();

    Ok(ExecutionPlan {
        upserts,
        deletes,
        dangling: deltas.dangling.clone(),
    })
}

fn upsert_step(delta: &Delta) -> Result<Option<Step>, CoreError> {
    if delta.to_create.is_empty() && delta.to_update.is_empty() {
        return Ok(None);
    }
    let kind = delta.kind;

    let mut nodes: BTreeMap<&str, (Verb, &ObjectDefinition, Option<&String>)> =
        BTreeMap::new();
    for definition in &delta.to_create {
        nodes.insert(definition.name(), (Verb::Create, definition, None));
    }
    for update in &delta.to_update {
        nodes.insert(
            update.desired.name(),
            (Verb::Update, &update.desired, update.previous.device_id.as_ref()),
        );
    }
    let graph: Graph<'_> = nodes
        .iter()
        .map(|(name, (_, definition, _))| (*name, same_kind(kind, &definition.dependencies)))
        .collect();

    let order = topological(kind, &graph)?;
    let operations = order
        .into_iter()
        .zip(0u32..)
        .filter_map(|(name, sequence_id)| {
            let (verb, definition, device_id) = nodes.get(name)?;
            Some(BatchOperation {
                sequence_id,
                verb: *verb,
                object: definition.reference.clone(),
                payload: Some(definition.attributes.clone()),
                device_id: device_id.cloned(),
            })
        })
        .collect();
    Ok(Some(Step { kind, operations }))
}

fn delete_step(delta: &Delta) -> Result<Option<Step>, CoreError> {
    if delta.to_delete.is_empty() {
        return Ok(None);
    }
    let kind = delta.kind;
    let nodes: BTreeMap<&str, &LiveObject> = delta
        .to_delete
        .iter()
        .map(|o| (o.definition.name(), o))
        .collect();
    let graph: Graph<'_> = nodes
        .iter()
        .map(|(name, object)| (*name, same_kind(kind, &object.definition.dependencies)))
        .collect();

    let mut order = topological(kind, &graph)?;
    order.reverse();
    let operations = order
        .into_iter()
        .zip(0u32..)
        .filter_map(|(name, sequence_id)| {
            let object = nodes.get(name)?;
            Some(BatchOperation {
                sequence_id,
                verb: Verb::Delete,
                object: object.reference().clone(),
                payload: None,
                device_id: object.device_id.clone(),
            })
        })
        .collect();
    Ok(Some(Step { kind, operations }))
}

// ── Containment graph ────────────────────────────────────────────────

/// Node name to the names (same kind) it contains.
type Graph<'a> = BTreeMap<&'a str, BTreeSet<&'a str>>;

fn same_kind(kind: ObjectKind, deps: &BTreeSet<ObjectRef>) -> BTreeSet<&str> {
    deps.iter()
        .filter(|d| d.kind == kind)
        .map(|d| d.name.as_str())
        .collect()
}

/// Members before containers; ties broken by name. Edges to names outside
/// the graph are already satisfied and ignored.
fn topological<'a>(kind: ObjectKind, graph: &Graph<'a>) -> Result<Vec<&'a str>, CoreError> {
    let mut pending: BTreeMap<&'a str, usize> = graph
        .iter()
        .map(|(name, deps)| {
            (*name, deps.iter().filter(|d| graph.contains_key(*d)).count())
        })
        .collect();
    let mut containers: BTreeMap<&'a str, Vec<&'a str>> = BTreeMap::new();
    for (name, deps) in graph {
        for dep in deps.iter().filter(|d| graph.contains_key(*d)) {
            containers.entry(*dep).or_default().push(*name);
        }
    }

    let mut ready: BTreeSet<&'a str> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(graph.len());

    while let Some(name) = ready.pop_first() {
        pending.remove(name);
        order.push(name);
        for container in containers.get(name).into_iter().flatten() {
            if let Some(count) = pending.get_mut(container) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*container);
                }
            }
        }
    }

    if pending.is_empty() {
        Ok(order)
    } else {
        Err(CoreError::CyclicDependency {
            kind,
            cycle: find_cycle(graph, &pending),
        })
    }
}

/// Walk unresolved nodes until one repeats; every node left over by Kahn's
/// algorithm has an unresolved member, so the walk always closes.
fn find_cycle(graph: &Graph<'_>, pending: &BTreeMap<&str, usize>) -> Vec<String> {
    let Some(&start) = pending.keys().next() else {
        return Vec::new();
    };
    let mut path: Vec<&str> = vec![start];
    let mut current = start;
    loop {
        let next = graph
            .get(current)
            .and_then(|deps| deps.iter().find(|d| pending.contains_key(*d)));
        let Some(next) = next else {
            break;
        };
        if let Some(at) = path.iter().position(|n| n == next) {
            let mut cycle: Vec<String> = path[at..].iter().map(|n| (*n).to_owned()).collect();
            cycle.push((*next).to_owned());
            return cycle;
        }
        path.push(*next);
        current = *next;
    }
    path.into_iter().map(str::to_owned).collect()
}
