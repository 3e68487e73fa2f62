use thiserror::Error;

/// Top-level error type for the `polsync-api` crate.
///
/// Covers every failure mode of the device API: authentication,
/// transport, device-reported errors, and response decoding.
/// `polsync-core` maps these into reconciliation-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Key generation failed (wrong credentials, account locked, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// A request was made before a session key was obtained.
    #[error("No session key -- log in first")]
    NotAuthenticated,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Device ──────────────────────────────────────────────────────
    /// Non-success HTTP status without a device envelope.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The device answered with `{"status": "error", ...}`.
    #[error("Device error{}: {message}", code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Device {
        message: String,
        code: Option<String>,
        /// Administrator holding a conflicting lock, when reported.
        holder: Option<String>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

/// Device error code reported when another administrator holds a lock.
pub const CODE_LOCK_HELD: &str = "lock-held";

/// Device error code reported when this session already owns the lock.
pub const CODE_LOCK_ALREADY_OWNED: &str = "lock-already-owned";

/// Device error code reported when releasing a lock that is not held.
pub const CODE_LOCK_NOT_HELD: &str = "lock-not-held";

impl Error {
    /// Returns `true` if the session key was rejected or never obtained.
    pub fn is_auth_expired(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::NotAuthenticated | Self::Http { status: 401, .. }
        )
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::Http { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// The device error code, if the device reported one.
    pub fn device_code(&self) -> Option<&str> {
        match self {
            Self::Device { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Returns `true` if the device refused a lock held by someone else.
    pub fn is_lock_held(&self) -> bool {
        self.device_code() == Some(CODE_LOCK_HELD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_error_display_includes_code() {
        let err = Error::Device {
            message: "config lock is held by admin2".into(),
            code: Some(CODE_LOCK_HELD.into()),
            holder: Some("admin2".into()),
        };
        assert_eq!(
            err.to_string(),
            "Device error (lock-held): config lock is held by admin2"
        );
        assert!(err.is_lock_held());
        assert!(!err.is_transient());
    }

    #[test]
    fn gateway_errors_are_transient() {
        let err = Error::Http {
            status: 503,
            message: "Service Unavailable".into(),
        };
        assert!(err.is_transient());
        assert!(Error::Timeout { timeout_secs: 5 }.is_transient());
        assert!(!Error::NotAuthenticated.is_transient());
    }
}
