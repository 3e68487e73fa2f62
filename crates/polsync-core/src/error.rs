// ── Core error types ──
//
// The reconciliation error taxonomy. Transport details never leak past
// this crate: the `From<polsync_api::Error>` impl folds them into the
// variants a caller can act on.

use polsync_api::LockKind;
use thiserror::Error;

use crate::model::{ObjectKind, ObjectRef};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Desired state (local, before any remote call) ────────────────
    #[error("{object}: {field} references unknown object `{name}`")]
    UnresolvedReference {
        object: ObjectRef,
        field: &'static str,
        name: String,
    },

    #[error("{object} is defined twice with conflicting `{field}` ({first} and {second})")]
    DuplicateName {
        object: ObjectRef,
        field: &'static str,
        first: String,
        second: String,
    },

    #[error("{position}: {message}")]
    MalformedRecord { position: String, message: String },

    // ── Remote ───────────────────────────────────────────────────────
    #[error("Device unreachable: {message}")]
    Connectivity { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("{} lock on {target} is held{}: {message}", kind.as_str(), holder.as_deref().map(|h| format!(" by {h}")).unwrap_or_default())]
    LockConflict {
        target: String,
        kind: LockKind,
        holder: Option<String>,
        message: String,
    },

    // ── Planning (local, before any write) ───────────────────────────
    #[error("Refusing to delete {object}: still referenced by {}", format_refs(referenced_by))]
    DanglingReference {
        object: ObjectRef,
        referenced_by: Vec<ObjectRef>,
    },

    #[error("Cyclic {kind} containment: {}", cycle.join(" -> "))]
    CyclicDependency { kind: ObjectKind, cycle: Vec<String> },

    // ── Execution ────────────────────────────────────────────────────
    #[error("{failed} {kind} operation(s) failed: {message}")]
    BatchOperation {
        kind: ObjectKind,
        failed: usize,
        message: String,
    },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// Device error code, or the HTTP status for non-envelope failures.
        code: Option<String>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_refs(refs: &[ObjectRef]) -> String {
    refs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl CoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// Errors detected locally, before anything is written to the device.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedReference { .. }
                | Self::DuplicateName { .. }
                | Self::MalformedRecord { .. }
                | Self::DanglingReference { .. }
                | Self::CyclicDependency { .. }
                | Self::Config { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<polsync_api::Error> for CoreError {
    fn from(err: polsync_api::Error) -> Self {
        match err {
            polsync_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            polsync_api::Error::NotAuthenticated => CoreError::AuthenticationFailed {
                message: "no session key -- authenticate first".into(),
            },
            polsync_api::Error::Transport(ref e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    CoreError::Connectivity {
                        message: err.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        code: e.status().map(|s| s.as_u16().to_string()),
                    }
                }
            }
            polsync_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            polsync_api::Error::Timeout { timeout_secs } => CoreError::Connectivity {
                message: format!("request timed out after {timeout_secs}s"),
            },
            polsync_api::Error::Tls(msg) => CoreError::Connectivity {
                message: format!("TLS error: {msg}"),
            },
            polsync_api::Error::Http { status, message } => match status {
                401 | 403 => CoreError::AuthenticationFailed { message },
                502..=504 => CoreError::Connectivity {
                    message: format!("HTTP {status}: {message}"),
                },
                _ => CoreError::Api {
                    message,
                    code: Some(status.to_string()),
                },
            },
            polsync_api::Error::Device { message, code, .. } => CoreError::Api { message, code },
            polsync_api::Error::Deserialization { message, .. } => CoreError::Api {
                message: format!("unexpected response: {message}"),
                code: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_retryable_connectivity() {
        let err: CoreError = polsync_api::Error::Timeout { timeout_secs: 30 }.into();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Device unreachable: request timed out after 30s");
    }

    #[test]
    fn unauthorized_maps_to_authentication() {
        let err: CoreError = polsync_api::Error::Http {
            status: 401,
            message: "Unauthorized".into(),
        }
        .into();
        assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn lock_conflict_names_holder() {
        let err = CoreError::LockConflict {
            target: "device-group branches".into(),
            kind: LockKind::Config,
            holder: Some("admin2".into()),
            message: "Config is locked by admin2".into(),
        };
        assert_eq!(
            err.to_string(),
            "config lock on device-group branches is held by admin2: Config is locked by admin2"
        );
    }

    #[test]
    fn dangling_reference_lists_dependents() {
        let err = CoreError::DanglingReference {
            object: ObjectRef::new(ObjectKind::Address, "A2"),
            referenced_by: vec![ObjectRef::new(ObjectKind::AddressGroup, "G1")],
        };
        assert_eq!(
            err.to_string(),
            "Refusing to delete address/A2: still referenced by address-group/G1"
        );
        assert!(err.is_local());
    }
}
