//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a process exit code.

use miette::Diagnostic;
use thiserror::Error;

use polsync_config::ConfigError;
use polsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const INVALID_INPUT: i32 = 4;
    pub const PARTIAL: i32 = 5;
    pub const LOCK_CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const CANCELLED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the device: {message}")]
    #[diagnostic(
        code(polsync::connection_failed),
        help(
            "Check that the management interface is reachable.\n\
             Self-signed certificate? Use --insecure (-k) or set ca_cert in your profile."
        )
    )]
    ConnectionFailed { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(polsync::auth_failed),
        help(
            "Verify the credentials for profile '{profile}'.\n\
             Passwords resolve from password_env, POLSYNC_PASSWORD, the keyring, then the profile."
        )
    )]
    AuthFailed { profile: String, message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(polsync::no_credentials),
        help("Set POLSYNC_API_KEY, or add username and password_env to the profile.")
    )]
    NoCredentials { profile: String },

    // ── Locks ────────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(polsync::lock_conflict),
        help("Another administrator or rollout holds the lock. Nothing was changed.")
    )]
    LockConflict { message: String },

    // ── Desired state ────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(polsync::invalid_desired_state),
        help("Nothing was sent to the device. Fix the records and run: polsync validate")
    )]
    InvalidDesiredState { message: String },

    #[error("Could not read {path}: {reason}")]
    #[diagnostic(code(polsync::input))]
    Input { path: String, reason: String },

    // ── Run outcome ──────────────────────────────────────────────────
    #[error("Deployment finished with {failed} failed and {withheld} withheld change(s)")]
    #[diagnostic(
        code(polsync::partial_failure),
        help("Everything not listed as failed or skipped was applied. Re-run to converge.")
    )]
    PartialFailure { failed: usize, withheld: usize },

    #[error("Deployment stopped: {message}")]
    #[diagnostic(code(polsync::aborted))]
    Aborted { message: String },

    #[error("Deployment cancelled")]
    #[diagnostic(
        code(polsync::cancelled),
        help("Steps completed before the interrupt remain applied.")
    )]
    Cancelled,

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(polsync::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(polsync::validation))]
    Validation { field: String, reason: String },

    #[error("No deployment scope")]
    #[diagnostic(
        code(polsync::no_scope),
        help("Pass --device-group (Panorama) or --vsys (firewall), or select a profile.")
    )]
    NoScope,

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(polsync::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No device configured")]
    #[diagnostic(
        code(polsync::no_config),
        help(
            "Add a profile to {path}\n\
             Or pass --url with --api-key."
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(polsync::config))]
    Config(Box<ConfigError>),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("'{action}' requires confirmation")]
    #[diagnostic(
        code(polsync::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {0}")]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::LockConflict { .. } => exit_code::LOCK_CONFLICT,
            Self::InvalidDesiredState { .. } | Self::Input { .. } => exit_code::INVALID_INPUT,
            Self::PartialFailure { .. } => exit_code::PARTIAL,
            Self::Cancelled => exit_code::CANCELLED,
            Self::Validation { .. }
            | Self::NoScope
            | Self::ProfileNotFound { .. }
            | Self::NoConfig { .. }
            | Self::Config(_)
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        if err.is_local() {
            return Self::InvalidDesiredState {
                message: err.to_string(),
            };
        }
        match err {
            CoreError::Connectivity { message } => Self::ConnectionFailed { message },

            CoreError::AuthenticationFailed { message } => Self::AuthFailed {
                profile: "current".into(),
                message,
            },

            lock @ CoreError::LockConflict { .. } => Self::LockConflict {
                message: lock.to_string(),
            },

            batch @ CoreError::BatchOperation { .. } => Self::Aborted {
                message: batch.to_string(),
            },

            CoreError::Api { message, code } => Self::ApiError {
                code: code.unwrap_or_else(|| "unknown".into()),
                message,
            },

            CoreError::Internal(message) => Self::ApiError {
                code: "internal".into(),
                message,
            },

            other => Self::Aborted {
                message: other.to_string(),
            },
        }
    }
}
