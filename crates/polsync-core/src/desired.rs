// ── Desired-state builder ──
//
// Turns declarative records into a cross-referenced object graph for one
// deployment scope. Pure: no I/O, and every failure surfaces before the
// device is contacted.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::CoreError;
use crate::model::{
    Attributes, DeploymentScope, ObjectDefinition, ObjectKind, ObjectRef, PredefinedCatalog,
    dependencies,
};

// ── Input records ────────────────────────────────────────────────────

/// Where a record came from, for error messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordPosition {
    /// Source label, usually a file path.
    pub source: String,
    /// Zero-based index of the record within the source.
    pub index: usize,
}

impl fmt::Display for RecordPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} record #{}", self.source, self.index + 1)
    }
}

/// One declarative record: `{ "kind": ..., "name": ..., <fields> }`.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub position: RecordPosition,
    pub value: Value,
}

impl SourceRecord {
    pub fn new(source: impl Into<String>, index: usize, value: Value) -> Self {
        Self {
            position: RecordPosition {
                source: source.into(),
                index,
            },
            value,
        }
    }
}

// ── Desired state ────────────────────────────────────────────────────

/// The complete desired object graph for one scope. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct DesiredState {
    scope: DeploymentScope,
    objects: BTreeMap<ObjectKind, BTreeMap<String, ObjectDefinition>>,
}

impl DesiredState {
    pub fn scope(&self) -> &DeploymentScope {
        &self.scope
    }

    /// Definitions of one kind, keyed by name.
    pub fn objects_of(&self, kind: ObjectKind) -> Option<&BTreeMap<String, ObjectDefinition>> {
        self.objects.get(&kind)
    }

    pub fn get(&self, reference: &ObjectRef) -> Option<&ObjectDefinition> {
        self.objects
            .get(&reference.kind)
            .and_then(|by_name| by_name.get(&reference.name))
    }

    pub fn contains(&self, reference: &ObjectRef) -> bool {
        self.get(reference).is_some()
    }

    /// Kinds with at least one definition, in creation order.
    pub fn kinds(&self) -> impl Iterator<Item = ObjectKind> + '_ {
        self.objects.keys().copied()
    }

    /// All definitions, kinds in creation order, names sorted.
    pub fn iter(&self) -> impl Iterator<Item = &ObjectDefinition> {
        self.objects.values().flat_map(BTreeMap::values)
    }

    pub fn len(&self) -> usize {
        self.objects.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-kind counts, for summaries.
    pub fn counts(&self) -> BTreeMap<ObjectKind, usize> {
        self.objects
            .iter()
            .map(|(kind, by_name)| (*kind, by_name.len()))
            .collect()
    }
}

// ── Builder ──────────────────────────────────────────────────────────

struct Pending {
    attributes: Attributes,
    position: RecordPosition,
}

/// Accumulates records, then links them into a [`DesiredState`].
///
/// Records naming the same object are merged: set-valued fields accumulate,
/// scalar fields must agree. Errors are reported for the first offending
/// record; nothing after it is examined.
pub struct DesiredStateBuilder {
    scope: DeploymentScope,
    catalog: PredefinedCatalog,
    environment: Option<String>,
    pending: BTreeMap<ObjectRef, Pending>,
}

impl DesiredStateBuilder {
    pub fn new(scope: DeploymentScope) -> Self {
        Self {
            scope,
            catalog: PredefinedCatalog::default(),
            environment: None,
            pending: BTreeMap::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: PredefinedCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Value substituted for `{environment}` in external list URLs.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Parse one record and fold it into the graph.
    pub fn add_record(&mut self, record: SourceRecord) -> Result<(), CoreError> {
        let SourceRecord { position, value } = record;
        let malformed = |message: String| CoreError::MalformedRecord {
            position: position.to_string(),
            message,
        };

        let Value::Object(mut fields) = value else {
            return Err(malformed("record is not a mapping".into()));
        };

        let kind = take_string(&mut fields, "kind").map_err(&malformed)?;
        let kind: ObjectKind = kind
            .parse()
            .map_err(|_| malformed(format!("unknown object kind `{kind}`")))?;
        let name = take_string(&mut fields, "name").map_err(&malformed)?;

        let mut attributes = Attributes::from_value(kind, Value::Object(fields))
            .map_err(|e| malformed(format!("invalid {kind} `{name}`: {e}")))?;
        if let Some(environment) = &self.environment {
            attributes.substitute_environment(environment);
        }
        attributes
            .validate()
            .map_err(|e| malformed(format!("invalid {kind} `{name}`: {e}")))?;

        self.insert(ObjectRef::new(kind, name), attributes.normalize(), position)
    }

    /// Add every record in order, stopping at the first error.
    pub fn add_records(
        &mut self,
        records: impl IntoIterator<Item = SourceRecord>,
    ) -> Result<(), CoreError> {
        records.into_iter().try_for_each(|r| self.add_record(r))
    }

    fn insert(
        &mut self,
        object: ObjectRef,
        attributes: Attributes,
        position: RecordPosition,
    ) -> Result<(), CoreError> {
        if let Some(existing) = self.pending.get_mut(&object) {
            if let Err(conflict) = existing.attributes.merge(attributes) {
                return Err(CoreError::DuplicateName {
                    object,
                    field: conflict.field,
                    first: existing.position.to_string(),
                    second: position.to_string(),
                });
            }
            debug!(%object, "merged repeated definition");
            return Ok(());
        }
        self.pending.insert(
            object,
            Pending {
                attributes,
                position,
            },
        );
        Ok(())
    }

    /// Resolve references and produce the immutable graph.
    pub fn build(self) -> Result<DesiredState, CoreError> {
        let names: BTreeSet<&ObjectRef> = self.pending.keys().collect();
        let mut objects: BTreeMap<ObjectKind, BTreeMap<String, ObjectDefinition>> = BTreeMap::new();

        for (reference, pending) in &self.pending {
            let attributes = pending.attributes.clone().canonicalize();
            let (deps, unresolved) = dependencies(&attributes, &self.catalog, |r| names.contains(r));
            if let Some((field, name)) = unresolved.into_iter().next() {
                return Err(CoreError::UnresolvedReference {
                    object: reference.clone(),
                    field,
                    name,
                });
            }
            objects.entry(reference.kind).or_default().insert(
                reference.name.clone(),
                ObjectDefinition {
                    reference: reference.clone(),
                    attributes,
                    dependencies: deps,
                },
            );
        }

        let state = DesiredState {
            scope: self.scope,
            objects,
        };
        debug!(objects = state.len(), scope = %state.scope, "desired state built");
        Ok(state)
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Result<String, String> {
    match fields.remove(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_owned()),
        Some(Value::String(_)) => Err(format!("`{key}` is empty")),
        Some(other) => Err(format!("`{key}` must be a string, got {other}")),
        None => Err(format!("missing `{key}`")),
    }
}
