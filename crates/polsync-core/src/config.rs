// ── Runtime configuration ──
//
// These types describe *how* to reach a device and *how* to run the
// engine. They carry credential data and tuning, but never touch disk.
// The CLI builds them from a profile and hands them in.

use std::collections::BTreeSet;
use std::time::Duration;

use polsync_api::{Credentials, TlsMode, TransportConfig};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::{ObjectKind, PredefinedCatalog};

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed management certificates).
    DangerAcceptInvalid,
}

/// How to reach and authenticate with one device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Management URL (e.g., `https://panorama.example.net`).
    pub url: Url,
    pub credentials: Credentials,
    pub tls: TlsVerification,
    /// Per-request timeout applied by the HTTP client.
    pub timeout: Duration,
}

impl DeviceConfig {
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
        }
    }
}

// ── Engine tuning ────────────────────────────────────────────────────

/// Atomicity of one physical batch request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchMode {
    /// All operations apply or none do.
    Atomic,
    /// Operations apply in order until the first failure.
    #[default]
    BestEffort,
}

/// What happens to the rest of a kind after one of its operations fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop the kind's remaining batches and skip kinds that depend on it.
    #[default]
    AbortKind,
    /// Stop the whole run at the first failed operation.
    AbortRun,
}

/// What happens when a deletion would leave a retained object dangling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DanglingPolicy {
    /// Keep the object, report it, and continue.
    #[default]
    Withhold,
    /// Fail planning with `DanglingReference`.
    Abort,
}

/// Retry policy for remote reads that fail with a connectivity error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each attempt after.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Engine tunables for one run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on operations per physical request.
    pub max_batch_size: usize,
    /// Concurrent discovery queries.
    pub inspect_concurrency: usize,
    /// Deadline for any single remote call.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub batch_mode: BatchMode,
    /// Submit the first physical request of a run atomically regardless of
    /// `batch_mode`.
    pub strict_first_batch: bool,
    pub failure_policy: FailurePolicy,
    pub dangling_policy: DanglingPolicy,
    /// Kinds the run reconciles. Others are read for reference checks but
    /// never written.
    pub managed_kinds: BTreeSet<ObjectKind>,
    /// Kinds whose extra live objects are never deleted.
    pub retain_kinds: BTreeSet<ObjectKind>,
    /// Lock comment; `None` uses `polsync rollout {run_id}`.
    pub lock_comment: Option<String>,
    /// Substituted for `{environment}` in external list URLs.
    pub environment: Option<String>,
    pub catalog: PredefinedCatalog,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            inspect_concurrency: 4,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            batch_mode: BatchMode::default(),
            strict_first_batch: true,
            failure_policy: FailurePolicy::default(),
            dangling_policy: DanglingPolicy::default(),
            managed_kinds: ObjectKind::all().into_iter().collect(),
            retain_kinds: BTreeSet::new(),
            lock_comment: None,
            environment: None,
            catalog: PredefinedCatalog::default(),
        }
    }
}

impl EngineConfig {
    pub fn is_managed(&self, kind: ObjectKind) -> bool {
        self.managed_kinds.contains(&kind)
    }

    /// Whether live objects of `kind` absent from the desired state are deleted.
    pub fn prunes(&self, kind: ObjectKind) -> bool {
        self.is_managed(kind) && !self.retain_kinds.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let retry = RetryPolicy {
            max_attempts: 4,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(retry.delay_for(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn retained_kinds_are_not_pruned() {
        let config = EngineConfig {
            retain_kinds: BTreeSet::from([ObjectKind::Tag]),
            ..EngineConfig::default()
        };
        assert!(config.is_managed(ObjectKind::Tag));
        assert!(!config.prunes(ObjectKind::Tag));
        assert!(config.prunes(ObjectKind::Address));
    }
}
