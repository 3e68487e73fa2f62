// ── Object identity and kind ordering ──
//
// `ObjectKind` fixes the type-level dependency order: iteration order is
// creation order, reverse iteration is deletion order.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use super::attributes::Attributes;

/// Every kind of object the engine manages, declared in creation order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ObjectKind {
    Tag,
    Address,
    Service,
    ExternalList,
    CustomUrlCategory,
    AddressGroup,
    ServiceGroup,
    ApplicationFilter,
    ApplicationGroup,
    LogForwardingProfile,
    AntivirusProfile,
    AntiSpywareProfile,
    VulnerabilityProfile,
    UrlFilteringProfile,
    FileBlockingProfile,
    WildfireProfile,
    DecryptionProfile,
    SecurityProfileGroup,
    SecurityRule,
    DecryptionRule,
}

impl ObjectKind {
    /// All kinds in creation order.
    pub fn all() -> Vec<Self> {
        Self::iter().collect()
    }

    /// Position in the creation order. Lower ranks are created first.
    pub fn rank(self) -> usize {
        Self::iter().position(|k| k == self).unwrap_or(usize::MAX)
    }

    /// Kinds whose objects this kind may reference.
    ///
    /// Self-references (group-of-groups) are listed too; the sequencer
    /// orders those within the kind.
    pub fn dependencies(self) -> &'static [ObjectKind] {
        use ObjectKind as K;
        match self {
            K::Tag | K::ExternalList | K::CustomUrlCategory | K::LogForwardingProfile => &[],
            K::Address | K::Service | K::ApplicationFilter => &[K::Tag],
            K::AddressGroup => &[K::Tag, K::Address, K::AddressGroup],
            K::ServiceGroup => &[K::Tag, K::Service, K::ServiceGroup],
            K::ApplicationGroup => &[K::ApplicationFilter, K::ApplicationGroup],
            K::AntivirusProfile
            | K::AntiSpywareProfile
            | K::VulnerabilityProfile
            | K::UrlFilteringProfile
            | K::FileBlockingProfile
            | K::WildfireProfile
            | K::DecryptionProfile => &[K::ExternalList, K::CustomUrlCategory],
            K::SecurityProfileGroup => &[
                K::AntivirusProfile,
                K::AntiSpywareProfile,
                K::VulnerabilityProfile,
                K::UrlFilteringProfile,
                K::FileBlockingProfile,
                K::WildfireProfile,
            ],
            K::SecurityRule => &[
                K::Tag,
                K::Address,
                K::Service,
                K::ExternalList,
                K::CustomUrlCategory,
                K::AddressGroup,
                K::ServiceGroup,
                K::ApplicationFilter,
                K::ApplicationGroup,
                K::LogForwardingProfile,
                K::SecurityProfileGroup,
            ],
            K::DecryptionRule => &[
                K::Tag,
                K::Address,
                K::Service,
                K::ExternalList,
                K::CustomUrlCategory,
                K::AddressGroup,
                K::ServiceGroup,
                K::LogForwardingProfile,
                K::DecryptionProfile,
            ],
        }
    }

    /// `true` if `self` references `other` directly or transitively.
    pub fn depends_on(self, other: ObjectKind) -> bool {
        let mut stack = vec![self];
        let mut seen = BTreeSet::new();
        while let Some(kind) = stack.pop() {
            for &dep in kind.dependencies() {
                if dep == kind {
                    continue;
                }
                if dep == other {
                    return true;
                }
                if seen.insert(dep) {
                    stack.push(dep);
                }
            }
        }
        false
    }

    /// Whether objects of this kind may contain others of the same kind.
    pub fn is_self_referential(self) -> bool {
        self.dependencies().contains(&self)
    }

    pub fn is_rule(self) -> bool {
        matches!(self, Self::SecurityRule | Self::DecryptionRule)
    }
}

// ── ObjectRef ────────────────────────────────────────────────────────

/// Stable identity of an object: its kind plus its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub name: String,
}

impl ObjectRef {
    pub fn new(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

// ── Definitions ──────────────────────────────────────────────────────

/// A fully typed object: identity, canonical attributes, and the managed
/// objects it references.
///
/// Two definitions are equivalent when their attributes are equal; the
/// dependency set is derived from the attributes and never compared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDefinition {
    #[serde(flatten)]
    pub reference: ObjectRef,
    pub attributes: Attributes,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<ObjectRef>,
}

impl ObjectDefinition {
    pub fn kind(&self) -> ObjectKind {
        self.reference.kind
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    /// Structural equality of the attribute bags.
    pub fn same_attributes(&self, other: &ObjectDefinition) -> bool {
        self.attributes == other.attributes
    }
}

/// An object as discovered on the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveObject {
    pub definition: ObjectDefinition,
    /// Device-assigned identifier (rule UUID), carried into updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl LiveObject {
    pub fn reference(&self) -> &ObjectRef {
        &self.definition.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_order_respects_dependencies() {
        for kind in ObjectKind::iter() {
            for &dep in kind.dependencies() {
                assert!(
                    dep.rank() <= kind.rank(),
                    "{kind} depends on {dep}, which is declared after it"
                );
            }
        }
    }

    #[test]
    fn kind_names_are_kebab_case() {
        assert_eq!(ObjectKind::AddressGroup.to_string(), "address-group");
        assert_eq!(
            "security-profile-group".parse::<ObjectKind>().ok(),
            Some(ObjectKind::SecurityProfileGroup)
        );
        assert_eq!(
            ObjectRef::new(ObjectKind::Tag, "prod").to_string(),
            "tag/prod"
        );
    }

    #[test]
    fn transitive_dependencies() {
        assert!(ObjectKind::SecurityRule.depends_on(ObjectKind::AntivirusProfile));
        assert!(ObjectKind::SecurityRule.depends_on(ObjectKind::Tag));
        assert!(!ObjectKind::Tag.depends_on(ObjectKind::Tag));
        assert!(!ObjectKind::Address.depends_on(ObjectKind::AddressGroup));
        assert!(ObjectKind::AddressGroup.is_self_referential());
        assert!(!ObjectKind::Address.is_self_referential());
    }
}
