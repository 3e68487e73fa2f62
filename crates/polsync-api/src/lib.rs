// polsync-api: Async client for a device's JSON configuration API.
//
// Covers the three capabilities the reconciliation engine needs:
// object enumeration, lock add/remove, and multi-operation submission.

pub mod auth;
pub mod client;
pub mod error;
pub mod transport;
pub mod types;

pub use auth::Credentials;
pub use client::DeviceClient;
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
pub use types::{
    Location, LocationType, LockKind, LockOutcome, MultiConfigOperation, MultiConfigRequest,
    MultiConfigResponse, OperationAction, OperationResponse, OperationStatus, SystemInfo,
};
