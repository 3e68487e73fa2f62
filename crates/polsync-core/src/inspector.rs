// ── Live-state inspector ──
//
// Reads the device's current objects, kind by kind. Reads are independent
// of each other, so they run concurrently up to `inspect_concurrency`.
// Every call is bounded by `request_timeout`; connectivity failures are
// retried with exponential backoff before they surface.

use std::collections::{BTreeMap, BTreeSet};

use futures_util::{StreamExt, TryStreamExt, stream};
use polsync_api::Location;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::model::{LiveObject, ObjectKind, ObjectRef, dependencies};
use crate::session::DeviceSession;

/// Everything discovered in one container.
///
/// A kind that was listed successfully but is empty is present with an
/// empty map, so "no objects" and "not inspected" stay distinguishable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveState {
    objects: BTreeMap<ObjectKind, BTreeMap<String, LiveObject>>,
}

impl LiveState {
    /// Assemble from per-kind listings and resolve live references.
    pub fn from_listings(
        listings: impl IntoIterator<Item = (ObjectKind, Vec<LiveObject>)>,
        config: &EngineConfig,
    ) -> Self {
        let mut objects: BTreeMap<ObjectKind, BTreeMap<String, LiveObject>> = BTreeMap::new();
        for (kind, listed) in listings {
            let by_name = objects.entry(kind).or_default();
            for object in listed {
                by_name.insert(object.definition.reference.name.clone(), object);
            }
        }

        let names: BTreeSet<ObjectRef> = objects
            .values()
            .flat_map(BTreeMap::values)
            .map(|o| o.reference().clone())
            .collect();
        for object in objects.values_mut().flat_map(BTreeMap::values_mut) {
            let (deps, unresolved) = dependencies(&object.definition.attributes, &config.catalog, |r| {
                names.contains(r)
            });
            if !unresolved.is_empty() {
                debug!(object = %object.reference(), ?unresolved, "live references outside the container");
            }
            object.definition.dependencies = deps;
        }

        Self { objects }
    }

    pub fn was_inspected(&self, kind: ObjectKind) -> bool {
        self.objects.contains_key(&kind)
    }

    pub fn objects_of(&self, kind: ObjectKind) -> Option<&BTreeMap<String, LiveObject>> {
        self.objects.get(&kind)
    }

    pub fn get(&self, reference: &ObjectRef) -> Option<&LiveObject> {
        self.objects
            .get(&reference.kind)
            .and_then(|by_name| by_name.get(&reference.name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveObject> {
        self.objects.values().flat_map(BTreeMap::values)
    }

    pub fn len(&self) -> usize {
        self.objects.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Queries one container through a session.
pub struct Inspector<'a, S> {
    session: &'a S,
    config: &'a EngineConfig,
}

impl<'a, S: DeviceSession> Inspector<'a, S> {
    pub fn new(session: &'a S, config: &'a EngineConfig) -> Self {
        Self { session, config }
    }

    /// List one kind, with timeout and retry.
    pub async fn inspect_kind(
        &self,
        container: &Location,
        kind: ObjectKind,
    ) -> Result<Vec<LiveObject>, CoreError> {
        let attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let listed = tokio::time::timeout(
                self.config.request_timeout,
                self.session.list_objects(container, kind),
            )
            .await
            .unwrap_or_else(|_| {
                Err(CoreError::Connectivity {
                    message: format!(
                        "listing {kind} timed out after {}s",
                        self.config.request_timeout.as_secs()
                    ),
                })
            });

            match listed {
                Ok(objects) => {
                    debug!(%kind, count = objects.len(), "inspected");
                    return Ok(objects);
                }
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.config.retry.delay_for(attempt);
                    warn!(%kind, attempt, ?delay, error = %err, "listing failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// List every kind in `kinds` concurrently. Fails on the first kind
    /// that cannot be determined; never returns a partial state.
    pub async fn discover(
        &self,
        container: &Location,
        kinds: &[ObjectKind],
    ) -> Result<LiveState, CoreError> {
        let listings: Vec<(ObjectKind, Vec<LiveObject>)> = stream::iter(kinds.iter().copied())
            .map(|kind| async move {
                self.inspect_kind(container, kind)
                    .await
                    .map(|objects| (kind, objects))
            })
            .buffer_unordered(self.config.inspect_concurrency.max(1))
            .try_collect()
            .await?;

        let state = LiveState::from_listings(listings, self.config);
        debug!(objects = state.len(), "live state discovered");
        Ok(state)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::RetryPolicy;
    use crate::memory::MemoryDevice;
    use crate::model::{Attributes, DeploymentScope};
    use serde_json::json;

    fn config() -> EngineConfig {
        EngineConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn empty_kinds_are_distinguishable() {
        let container = DeploymentScope::firewall("vsys1").container();
        let device = MemoryDevice::new();
        let config = config();
        let state = Inspector::new(&device, &config)
            .discover(&container, &[ObjectKind::Tag])
            .await
            .unwrap();
        assert!(state.was_inspected(ObjectKind::Tag));
        assert!(!state.was_inspected(ObjectKind::Address));
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn transient_listing_failures_are_retried() {
        let container = DeploymentScope::firewall("vsys1").container();
        let device = MemoryDevice::new();
        device.fail_listing(ObjectKind::Address, 2);
        let config = config();

        let objects = Inspector::new(&device, &config)
            .inspect_kind(&container, ObjectKind::Address)
            .await
            .unwrap();
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn persistent_failure_surfaces_connectivity() {
        let container = DeploymentScope::firewall("vsys1").container();
        let device = MemoryDevice::new();
        device.fail_listing(ObjectKind::Address, 5);
        let config = config();

        let err = Inspector::new(&device, &config)
            .discover(&container, &[ObjectKind::Tag, ObjectKind::Address])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn live_dependencies_are_linked() {
        let container = DeploymentScope::firewall("vsys1").container();
        let device = MemoryDevice::new();
        device.seed(
            &container,
            ObjectKind::Address,
            "A2",
            Attributes::from_value(ObjectKind::Address, json!({ "value": "10.0.0.2" })).unwrap(),
        );
        device.seed(
            &container,
            ObjectKind::AddressGroup,
            "G1",
            Attributes::from_value(ObjectKind::AddressGroup, json!({ "static-members": ["A2"] }))
                .unwrap(),
        );
        let config = config();

        let state = Inspector::new(&device, &config)
            .discover(&container, &ObjectKind::all())
            .await
            .unwrap();
        let group = state
            .get(&ObjectRef::new(ObjectKind::AddressGroup, "G1"))
            .unwrap();
        assert!(group
            .definition
            .dependencies
            .contains(&ObjectRef::new(ObjectKind::Address, "A2")));
    }
}
