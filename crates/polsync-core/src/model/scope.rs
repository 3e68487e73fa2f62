// ── Deployment scope ──

use std::fmt;

use polsync_api::{Location, LocationType};
use serde::{Deserialize, Serialize};

/// The remote container a run targets.
///
/// Objects always live in one container (device group or vsys); locks may
/// cover more than that container (a Panorama template as well).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DeploymentScope {
    /// A Panorama device group, optionally paired with a template.
    Panorama {
        device_group: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
    },
    /// A single firewall virtual system.
    Firewall { vsys: String },
}

impl DeploymentScope {
    pub fn panorama(device_group: impl Into<String>, template: Option<String>) -> Self {
        Self::Panorama {
            device_group: device_group.into(),
            template,
        }
    }

    pub fn firewall(vsys: impl Into<String>) -> Self {
        Self::Firewall { vsys: vsys.into() }
    }

    /// Where objects are read and written.
    pub fn container(&self) -> Location {
        match self {
            Self::Panorama { device_group, .. } => {
                Location::new(LocationType::DeviceGroup, device_group.clone())
            }
            Self::Firewall { vsys } => Location::new(LocationType::Vsys, vsys.clone()),
        }
    }

    /// Every location that must be locked, in acquisition order.
    pub fn lock_targets(&self) -> Vec<Location> {
        match self {
            Self::Panorama {
                device_group,
                template,
            } => template
                .iter()
                .map(|t| Location::new(LocationType::Template, t.clone()))
                .chain(std::iter::once(Location::new(
                    LocationType::DeviceGroup,
                    device_group.clone(),
                )))
                .collect(),
            Self::Firewall { vsys } => vec![Location::new(LocationType::Vsys, vsys.clone())],
        }
    }
}

impl fmt::Display for DeploymentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Panorama {
                device_group,
                template: Some(template),
            } => write!(f, "device-group {device_group} (template {template})"),
            Self::Panorama { device_group, .. } => write!(f, "device-group {device_group}"),
            Self::Firewall { vsys } => write!(f, "vsys {vsys}"),
        }
    }
}

/// Human-readable label for a lock target.
pub fn location_label(location: &Location) -> String {
    format!("{} {}", location.location_type.as_str(), location.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panorama_locks_template_before_device_group() {
        let scope = DeploymentScope::panorama("branches", Some("branch-net".into()));
        let targets: Vec<_> = scope.lock_targets().iter().map(location_label).collect();
        assert_eq!(targets, vec!["template branch-net", "device-group branches"]);
        assert_eq!(scope.container().location_type, LocationType::DeviceGroup);
    }

    #[test]
    fn firewall_scope_is_a_single_vsys() {
        let scope = DeploymentScope::firewall("vsys1");
        assert_eq!(scope.lock_targets(), vec![scope.container()]);
        assert_eq!(scope.to_string(), "vsys vsys1");
    }
}
