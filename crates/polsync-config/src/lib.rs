//! Shared configuration for the polsync CLI.
//!
//! TOML profiles merged with `POLSYNC_` environment variables, credential
//! resolution (env + keyring + plaintext), and translation to the core
//! runtime types: [`DeviceConfig`], [`EngineConfig`] and
//! [`DeploymentScope`]. The CLI layers its flag overrides on top.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use polsync_core::{
    BatchMode, Credentials, DanglingPolicy, DeploymentScope, DeviceConfig, EngineConfig,
    FailurePolicy, ObjectKind, PredefinedCatalog, RetryPolicy, TlsVerification,
};

const KEYRING_SERVICE: &str = "polsync";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }

    /// Copy with plaintext secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for profile in copy.profiles.values_mut() {
            if profile.password.is_some() {
                profile.password = Some("********".into());
            }
            if profile.api_key.is_some() {
                profile.api_key = Some("********".into());
            }
        }
        copy
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// What kind of management endpoint a profile points at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Panorama,
    Firewall,
}

/// A named device profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Management URL (e.g., "https://panorama.example.net").
    pub url: String,

    #[serde(default)]
    pub target: Target,

    /// Panorama device group that holds the objects.
    pub device_group: Option<String>,

    /// Panorama template locked alongside the device group.
    pub template: Option<String>,

    /// Firewall virtual system (defaults to "vsys1").
    pub vsys: Option<String>,

    /// Administrator name for keygen login.
    pub username: Option<String>,

    /// Password (plaintext -- prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Pre-generated API key (plaintext -- prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Substituted for `{environment}` in external list URLs.
    pub environment: Option<String>,

    #[serde(default)]
    pub engine: EngineSettings,
}

/// Engine tunables; anything unset keeps the engine default.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    pub max_batch_size: Option<usize>,
    pub inspect_concurrency: Option<usize>,
    pub batch_mode: Option<BatchMode>,
    pub strict_first_batch: Option<bool>,
    pub failure_policy: Option<FailurePolicy>,
    pub dangling_policy: Option<DanglingPolicy>,
    pub retry_attempts: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
    /// Kinds to reconcile; unset means all.
    pub managed_kinds: Option<Vec<ObjectKind>>,
    /// Kinds whose extra live objects are never deleted.
    pub retain_kinds: Vec<ObjectKind>,
    pub lock_comment: Option<String>,
    pub catalog: Option<PredefinedCatalog>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "polsync", "polsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("polsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file path + environment. A missing file yields
/// the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("POLSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Credential resolution ───────────────────────────────────────────

fn from_keyring(profile_name: &str, secret: &str) -> Option<SecretString> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/{secret}")).ok()?;
    entry.get_password().ok().map(SecretString::from)
}

/// Resolve a password: `password_env` → `POLSYNC_PASSWORD` → keyring →
/// plaintext.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            debug!(profile = profile_name, source = "password_env", "password resolved");
            return Ok(SecretString::from(val));
        }
    }

    if let Ok(val) = std::env::var("POLSYNC_PASSWORD") {
        debug!(profile = profile_name, source = "env", "password resolved");
        return Ok(SecretString::from(val));
    }

    if let Some(secret) = from_keyring(profile_name, "password") {
        debug!(profile = profile_name, source = "keyring", "password resolved");
        return Ok(secret);
    }

    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve an API key: `api_key_env` → `POLSYNC_API_KEY` → keyring →
/// plaintext.
pub fn resolve_api_key(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.api_key_env {
        if let Ok(val) = std::env::var(env_name) {
            debug!(profile = profile_name, source = "api_key_env", "API key resolved");
            return Ok(SecretString::from(val));
        }
    }

    if let Ok(val) = std::env::var("POLSYNC_API_KEY") {
        debug!(profile = profile_name, source = "env", "API key resolved");
        return Ok(SecretString::from(val));
    }

    if let Some(secret) = from_keyring(profile_name, "api-key") {
        debug!(profile = profile_name, source = "keyring", "API key resolved");
        return Ok(secret);
    }

    if let Some(ref key) = profile.api_key {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Profiles with a username log in with a password; others use an API key.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Credentials, ConfigError> {
    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var("POLSYNC_USERNAME").ok());
    match username {
        Some(username) => Ok(Credentials::Password {
            username,
            password: resolve_password(profile, profile_name)?,
        }),
        None => Ok(Credentials::ApiKey {
            key: resolve_api_key(profile, profile_name)?,
        }),
    }
}

// ── Translation to runtime types ────────────────────────────────────

/// The deployment scope a profile targets.
pub fn profile_scope(profile: &Profile) -> Result<DeploymentScope, ConfigError> {
    match profile.target {
        Target::Panorama => {
            let device_group = profile
                .device_group
                .clone()
                .ok_or_else(|| ConfigError::Validation {
                    field: "device_group".into(),
                    reason: "required for panorama targets".into(),
                })?;
            Ok(DeploymentScope::panorama(device_group, profile.template.clone()))
        }
        Target::Firewall => {
            if profile.device_group.is_some() || profile.template.is_some() {
                return Err(ConfigError::Validation {
                    field: "target".into(),
                    reason: "device_group and template only apply to panorama targets".into(),
                });
            }
            Ok(DeploymentScope::firewall(
                profile.vsys.clone().unwrap_or_else(|| "vsys1".into()),
            ))
        }
    }
}

/// Build a `DeviceConfig` from a profile -- no CLI flag overrides.
pub fn profile_to_device_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<DeviceConfig, ConfigError> {
    let url: url::Url = profile.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {}", profile.url),
    })?;

    let credentials = resolve_credentials(profile, profile_name)?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    Ok(DeviceConfig {
        url,
        credentials,
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
    })
}

/// Build an `EngineConfig` from a profile's engine settings.
pub fn profile_to_engine_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<EngineConfig, ConfigError> {
    let settings = &profile.engine;
    let base = EngineConfig::default();

    let max_batch_size = settings.max_batch_size.unwrap_or(base.max_batch_size);
    if max_batch_size == 0 {
        return Err(ConfigError::Validation {
            field: "engine.max_batch_size".into(),
            reason: "must be at least 1".into(),
        });
    }
    let inspect_concurrency = settings
        .inspect_concurrency
        .unwrap_or(base.inspect_concurrency);
    if inspect_concurrency == 0 {
        return Err(ConfigError::Validation {
            field: "engine.inspect_concurrency".into(),
            reason: "must be at least 1".into(),
        });
    }

    let retry = RetryPolicy {
        max_attempts: settings.retry_attempts.unwrap_or(base.retry.max_attempts),
        backoff: settings
            .retry_backoff_ms
            .map_or(base.retry.backoff, Duration::from_millis),
    };

    let managed_kinds = settings.managed_kinds.as_ref().map_or_else(
        || base.managed_kinds.clone(),
        |kinds| kinds.iter().copied().collect::<BTreeSet<_>>(),
    );

    Ok(EngineConfig {
        max_batch_size,
        inspect_concurrency,
        request_timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        retry,
        batch_mode: settings.batch_mode.unwrap_or(base.batch_mode),
        strict_first_batch: settings
            .strict_first_batch
            .unwrap_or(base.strict_first_batch),
        failure_policy: settings.failure_policy.unwrap_or(base.failure_policy),
        dangling_policy: settings.dangling_policy.unwrap_or(base.dangling_policy),
        managed_kinds,
        retain_kinds: settings.retain_kinds.iter().copied().collect(),
        lock_comment: settings.lock_comment.clone(),
        environment: profile.environment.clone(),
        catalog: settings.catalog.clone().unwrap_or(base.catalog),
    })
}
