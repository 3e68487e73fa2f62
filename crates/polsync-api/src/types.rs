// Wire types for the device configuration API.
//
// Every response is wrapped in `{ status, result?, code?, message?, holder? }`.
// Object entries stay as raw JSON values here; typing them is the
// core crate's job.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Locations ────────────────────────────────────────────────────────

/// Kind of configuration container on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationType {
    DeviceGroup,
    Template,
    Vsys,
}

impl LocationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeviceGroup => "device-group",
            Self::Template => "template",
            Self::Vsys => "vsys",
        }
    }
}

/// A named configuration container (device group, template, or vsys).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "type")]
    pub location_type: LocationType,
    pub name: String,
}

impl Location {
    pub fn new(location_type: LocationType, name: impl Into<String>) -> Self {
        Self {
            location_type,
            name: name.into(),
        }
    }

    /// Query parameters identifying this location on GET requests.
    pub(crate) fn query(&self) -> [(&'static str, String); 2] {
        [
            ("location_type", self.location_type.as_str().to_owned()),
            ("location_name", self.name.clone()),
        ]
    }
}

// ── Locks ────────────────────────────────────────────────────────────

/// The two exclusive lock kinds a device exposes per location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockKind {
    Config,
    Commit,
}

impl LockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Commit => "commit",
        }
    }
}

/// What the device reported when a lock was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The lock was newly taken by this session.
    Acquired,
    /// This session already owned the lock.
    AlreadyOwned,
}

// ── Envelope ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    Error,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub status: OperationStatus,
    pub result: Option<T>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub holder: Option<String>,
}

// ── Payloads ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct KeygenResult {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ObjectList {
    #[serde(default)]
    pub entries: Vec<Value>,
}

/// Basic system facts, used to validate connectivity after login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub sw_version: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
}

// ── Multi-config ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationAction {
    Create,
    Update,
    Delete,
}

/// One sub-operation of a multi-config request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiConfigOperation {
    pub id: u32,
    pub action: OperationAction,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<Value>,
    /// Device identifier of the object being edited, kept stable across updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

/// A batch of sub-operations applied to one location in one request.
///
/// With `strict` set the device applies all operations or none; it also
/// refuses the request while a commit is pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiConfigRequest {
    pub strict: bool,
    pub location: Location,
    pub operations: Vec<MultiConfigOperation>,
}

/// Per-operation result inside a multi-config response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub id: u32,
    pub status: OperationStatus,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Identifier assigned by the device to a created object.
    #[serde(default)]
    pub uuid: Option<String>,
}

/// Aggregate result of a multi-config request.
///
/// Operations without a matching entry in `responses` were never attempted
/// (the device stops at the first failure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiConfigResponse {
    pub status: OperationStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub responses: Vec<OperationResponse>,
}

impl MultiConfigResponse {
    pub fn is_success(&self) -> bool {
        self.status == OperationStatus::Success
    }

    /// Look up the response for a given operation id.
    pub fn response_for(&self, id: u32) -> Option<&OperationResponse> {
        self.responses.iter().find(|r| r.id == id)
    }
}
