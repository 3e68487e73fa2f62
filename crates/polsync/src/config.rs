//! Resolve profile settings and CLI flag overrides into core runtime types.

use std::time::Duration;

use secrecy::SecretString;

use polsync_config::{Config, Defaults, Profile};
use polsync_core::{
    Credentials, DeploymentScope, DeviceConfig, EngineConfig, TlsVerification,
};

use crate::cli::{EngineArgs, GlobalOpts};
use crate::error::CliError;

/// The loaded config file plus the profile this invocation uses.
pub struct Resolved {
    pub config: Config,
    pub profile_name: String,
}

impl Resolved {
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let path = global
            .config
            .clone()
            .unwrap_or_else(polsync_config::config_path);
        let config = polsync_config::load_config_from(&path)?;

        let profile_name = global
            .profile
            .clone()
            .or_else(|| config.default_profile.clone())
            .unwrap_or_else(|| "default".into());

        // An explicitly requested profile must exist; the default may not.
        if global.profile.is_some() && !config.profiles.contains_key(&profile_name) {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(&config),
            });
        }

        Ok(Self {
            config,
            profile_name,
        })
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.config.profiles.get(&self.profile_name)
    }

    pub fn defaults(&self) -> &Defaults {
        &self.config.defaults
    }

    /// Scope flags win over the profile.
    pub fn scope(&self, global: &GlobalOpts) -> Result<DeploymentScope, CliError> {
        if let Some(ref device_group) = global.device_group {
            return Ok(DeploymentScope::panorama(
                device_group.clone(),
                global.template.clone(),
            ));
        }
        if let Some(ref vsys) = global.vsys {
            return Ok(DeploymentScope::firewall(vsys.clone()));
        }
        match self.profile() {
            Some(profile) => Ok(polsync_config::profile_scope(profile)?),
            None => Err(CliError::NoScope),
        }
    }

    pub fn device(&self, global: &GlobalOpts) -> Result<DeviceConfig, CliError> {
        let Some(profile) = self.profile() else {
            return self.device_from_flags(global);
        };

        let mut device =
            polsync_config::profile_to_device_config(profile, &self.profile_name, self.defaults())?;
        if let Some(ref url) = global.url {
            device.url = parse_url(url)?;
        }
        if let Some(ref key) = global.api_key {
            device.credentials = Credentials::ApiKey {
                key: SecretString::from(key.clone()),
            };
        }
        if global.insecure {
            device.tls = TlsVerification::DangerAcceptInvalid;
        }
        if let Some(timeout) = global.timeout {
            device.timeout = Duration::from_secs(timeout);
        }
        Ok(device)
    }

    /// No profile: the URL and API key must come from flags or env.
    fn device_from_flags(&self, global: &GlobalOpts) -> Result<DeviceConfig, CliError> {
        let url = global.url.as_deref().ok_or_else(|| CliError::NoConfig {
            path: polsync_config::config_path().display().to_string(),
        })?;
        let key = global
            .api_key
            .clone()
            .ok_or_else(|| CliError::NoCredentials {
                profile: self.profile_name.clone(),
            })?;

        Ok(DeviceConfig {
            url: parse_url(url)?,
            credentials: Credentials::ApiKey {
                key: SecretString::from(key),
            },
            tls: if global.insecure || self.defaults().insecure {
                TlsVerification::DangerAcceptInvalid
            } else {
                TlsVerification::SystemDefaults
            },
            timeout: Duration::from_secs(global.timeout.unwrap_or(self.defaults().timeout)),
        })
    }

    pub fn engine(&self, global: &GlobalOpts, args: Option<&EngineArgs>) -> Result<EngineConfig, CliError> {
        let mut engine = match self.profile() {
            Some(profile) => polsync_config::profile_to_engine_config(profile, self.defaults())?,
            None => EngineConfig {
                request_timeout: Duration::from_secs(self.defaults().timeout),
                ..EngineConfig::default()
            },
        };

        if let Some(timeout) = global.timeout {
            engine.request_timeout = Duration::from_secs(timeout);
        }
        if let Some(ref environment) = global.environment {
            engine.environment = Some(environment.clone());
        }

        if let Some(args) = args {
            if let Some(size) = args.max_batch_size {
                if size == 0 {
                    return Err(CliError::Validation {
                        field: "max-batch-size".into(),
                        reason: "must be at least 1".into(),
                    });
                }
                engine.max_batch_size = size;
            }
            if let Some(mode) = args.batch_mode {
                engine.batch_mode = mode.into();
            }
            if let Some(policy) = args.on_failure {
                engine.failure_policy = policy.into();
            }
            engine.retain_kinds.extend(args.retain.iter().copied());
        }
        Ok(engine)
    }
}

fn parse_url(raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

fn available_profiles(config: &Config) -> String {
    if config.profiles.is_empty() {
        return "(none)".into();
    }
    config
        .profiles
        .keys()
        .cloned()
        .collect::<Vec<_>>()
        .join(", ")
}
