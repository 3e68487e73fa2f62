// ── Remote device session ──
//
// `DeviceSession` over the JSON configuration API.

use polsync_api::{
    DeviceClient, Error as ApiError, Location, LockKind, LockOutcome, MultiConfigRequest,
};
use tracing::{debug, info};

use crate::batch::{BatchOperation, BatchResult};
use crate::config::DeviceConfig;
use crate::convert;
use crate::error::CoreError;
use crate::model::{LiveObject, ObjectKind, location_label};
use crate::session::DeviceSession;

/// An authenticated session with one device.
pub struct RemoteSession {
    client: DeviceClient,
}

impl RemoteSession {
    /// Build the HTTP client, authenticate, and confirm the device answers.
    pub async fn connect(config: &DeviceConfig) -> Result<Self, CoreError> {
        let client = DeviceClient::new(config.url.as_str(), &config.transport())?;
        client.authenticate(&config.credentials).await?;
        let info = client.system_info().await?;
        info!(
            hostname = %info.hostname,
            model = info.model.as_deref().unwrap_or("unknown"),
            version = info.sw_version.as_deref().unwrap_or("unknown"),
            "connected to device"
        );
        Ok(Self { client })
    }

    /// Wrap an already-authenticated client.
    pub fn from_client(client: DeviceClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DeviceClient {
        &self.client
    }
}

impl DeviceSession for RemoteSession {
    async fn list_objects(
        &self,
        container: &Location,
        kind: ObjectKind,
    ) -> Result<Vec<LiveObject>, CoreError> {
        let entries = self.client.list_objects(container, kind.as_ref()).await?;
        entries
            .into_iter()
            .map(|entry| convert::live_object(kind, entry))
            .collect()
    }

    async fn acquire_lock(
        &self,
        target: &Location,
        kind: LockKind,
        comment: &str,
    ) -> Result<LockOutcome, CoreError> {
        match self.client.acquire_lock(target, kind, comment).await {
            Ok(outcome) => Ok(outcome),
            Err(ApiError::Device {
                message,
                code,
                holder,
            }) if code.as_deref() == Some(polsync_api::error::CODE_LOCK_HELD) => {
                Err(CoreError::LockConflict {
                    target: location_label(target),
                    kind,
                    holder,
                    message,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn release_lock(&self, target: &Location, kind: LockKind) -> Result<(), CoreError> {
        let released = self.client.release_lock(target, kind).await?;
        if !released {
            debug!(target = %location_label(target), kind = kind.as_str(), "lock was not held");
        }
        Ok(())
    }

    async fn submit_batch(
        &self,
        container: &Location,
        operations: &[BatchOperation],
        atomic: bool,
    ) -> Result<Vec<BatchResult>, CoreError> {
        let request = MultiConfigRequest {
            strict: atomic,
            location: container.clone(),
            operations: operations.iter().map(convert::operation).collect(),
        };
        let response = self.client.multi_config(&request).await?;
        Ok(convert::results(operations, &response, atomic))
    }
}
