// ── Typed attribute bags ──
//
// One struct per object kind (the security profile kinds share one). Record
// field names are kebab-case; unknown fields are rejected so that a typo in
// an input document never silently becomes a no-op.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::canonical;
use super::object::ObjectKind;

// ── Enumerations ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressType {
    #[default]
    IpNetmask,
    IpRange,
    Fqdn,
    IpWildcard,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalListType {
    #[default]
    Ip,
    Domain,
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshInterval {
    FiveMinute,
    Hourly,
    Daily,
    Weekly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CategoryType {
    #[default]
    UrlList,
    CategoryMatch,
}

/// Which rulebase a rule lives in (Panorama pre- or post-rules).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rulebase {
    #[default]
    Pre,
    Post,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    #[default]
    Universal,
    Interzone,
    Intrazone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleAction {
    Allow,
    Deny,
    Drop,
    ResetClient,
    ResetServer,
    ResetBoth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecryptionAction {
    Decrypt,
    NoDecrypt,
}

// ── Leaf objects ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct TagAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct AddressAttrs {
    #[serde(rename = "type", default)]
    pub address_type: AddressType,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ServiceAttrs {
    #[serde(default)]
    pub protocol: Protocol,
    pub destination_port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

/// External dynamic list. `url` may contain `{environment}`, substituted
/// when the desired state is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ExternalListAttrs {
    #[serde(rename = "type", default)]
    pub list_type: ExternalListType,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<RefreshInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exceptions: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CustomUrlCategoryAttrs {
    #[serde(rename = "type", default)]
    pub category_type: CategoryType,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub entries: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ── Groups and filters ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct AddressGroupAttrs {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub static_members: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ServiceGroupAttrs {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub members: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ApplicationFilterAttrs {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub categories: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub subcategories: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub technologies: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub risks: BTreeSet<String>,
    /// Applications excluded from the filter (predefined names).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub exclude: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ApplicationGroupAttrs {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub members: BTreeSet<String>,
}

// ── Profiles ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct LogForwardingProfileAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_lists: BTreeMap<String, Value>,
}

/// Shared shape of every security and decryption profile.
///
/// `settings` is opaque to the engine and compared structurally; `lists`
/// names the custom URL categories and external lists the profile uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct ProfileAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub settings: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub lists: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct SecurityProfileGroupAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antivirus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anti_spyware: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_filtering: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_blocking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wildfire: Option<String>,
}

// ── Rules ────────────────────────────────────────────────────────────

fn enabled() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
#[allow(clippy::struct_excessive_bools)]
pub struct SecurityRuleAttrs {
    #[serde(default)]
    pub rulebase: Rulebase,
    #[serde(rename = "type", default)]
    pub rule_type: RuleType,
    #[serde(default)]
    pub from_zones: BTreeSet<String>,
    #[serde(default)]
    pub to_zones: BTreeSet<String>,
    #[serde(default)]
    pub sources: BTreeSet<String>,
    #[serde(default)]
    pub destinations: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub negate_source: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub negate_destination: bool,
    #[serde(default)]
    pub source_users: BTreeSet<String>,
    #[serde(default)]
    pub applications: BTreeSet<String>,
    #[serde(default)]
    pub services: BTreeSet<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_setting: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub log_start: bool,
    #[serde(default = "enabled")]
    pub log_end: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct DecryptionRuleAttrs {
    #[serde(default)]
    pub rulebase: Rulebase,
    #[serde(default)]
    pub from_zones: BTreeSet<String>,
    #[serde(default)]
    pub to_zones: BTreeSet<String>,
    #[serde(default)]
    pub sources: BTreeSet<String>,
    #[serde(default)]
    pub destinations: BTreeSet<String>,
    #[serde(default)]
    pub source_users: BTreeSet<String>,
    #[serde(default)]
    pub services: BTreeSet<String>,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    pub action: DecryptionAction,
    /// Decryption type such as `ssl-forward-proxy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decryption_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_setting: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub disabled: bool,
}

// ── Attributes ───────────────────────────────────────────────────────

/// The typed attribute bag of one object. The variant always matches the
/// object's kind; all profile kinds share [`ProfileAttrs`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Attributes {
    Tag(TagAttrs),
    Address(AddressAttrs),
    Service(ServiceAttrs),
    ExternalList(ExternalListAttrs),
    CustomUrlCategory(CustomUrlCategoryAttrs),
    AddressGroup(AddressGroupAttrs),
    ServiceGroup(ServiceGroupAttrs),
    ApplicationFilter(ApplicationFilterAttrs),
    ApplicationGroup(ApplicationGroupAttrs),
    LogForwardingProfile(LogForwardingProfileAttrs),
    Profile(ProfileAttrs),
    SecurityProfileGroup(SecurityProfileGroupAttrs),
    SecurityRule(SecurityRuleAttrs),
    DecryptionRule(DecryptionRuleAttrs),
}

/// How a referenced name may be satisfied besides a managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceClass {
    /// Only a managed object satisfies it.
    Object,
    /// Rule address fields: `any` and IP literals are not references.
    Address,
    /// `any`, `application-default` and predefined services.
    Service,
    /// `any` and predefined applications.
    Application,
    /// `any` and predefined URL categories.
    UrlCategory,
    /// Predefined security profiles.
    Profile,
}

/// A name mentioned by an attribute bag that may point at a managed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    pub field: &'static str,
    pub name: &'a str,
    /// Kinds the name may resolve to, in lookup order.
    pub candidates: &'static [ObjectKind],
    pub class: ReferenceClass,
}

/// A scalar field set to two different values by two records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConflict {
    pub field: &'static str,
}

use ObjectKind as K;

const TAG: &[ObjectKind] = &[K::Tag];
const ADDRESS_MEMBER: &[ObjectKind] = &[K::Address, K::AddressGroup];
const RULE_ADDRESS: &[ObjectKind] = &[K::Address, K::AddressGroup, K::ExternalList];
const SERVICE_MEMBER: &[ObjectKind] = &[K::Service, K::ServiceGroup];
const APPLICATION_MEMBER: &[ObjectKind] = &[K::ApplicationGroup, K::ApplicationFilter];
const URL_LIST: &[ObjectKind] = &[K::CustomUrlCategory, K::ExternalList];
const LOG_PROFILE: &[ObjectKind] = &[K::LogForwardingProfile];
const PROFILE_GROUP: &[ObjectKind] = &[K::SecurityProfileGroup];
const DECRYPTION_PROFILE: &[ObjectKind] = &[K::DecryptionProfile];

impl Attributes {
    /// Decode a record body (without `kind`/`name`) as the bag for `kind`.
    pub fn from_value(kind: ObjectKind, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            K::Tag => Self::Tag(serde_json::from_value(value)?),
            K::Address => Self::Address(serde_json::from_value(value)?),
            K::Service => Self::Service(serde_json::from_value(value)?),
            K::ExternalList => Self::ExternalList(serde_json::from_value(value)?),
            K::CustomUrlCategory => Self::CustomUrlCategory(serde_json::from_value(value)?),
            K::AddressGroup => Self::AddressGroup(serde_json::from_value(value)?),
            K::ServiceGroup => Self::ServiceGroup(serde_json::from_value(value)?),
            K::ApplicationFilter => Self::ApplicationFilter(serde_json::from_value(value)?),
            K::ApplicationGroup => Self::ApplicationGroup(serde_json::from_value(value)?),
            K::LogForwardingProfile => Self::LogForwardingProfile(serde_json::from_value(value)?),
            K::AntivirusProfile
            | K::AntiSpywareProfile
            | K::VulnerabilityProfile
            | K::UrlFilteringProfile
            | K::FileBlockingProfile
            | K::WildfireProfile
            | K::DecryptionProfile => Self::Profile(serde_json::from_value(value)?),
            K::SecurityProfileGroup => Self::SecurityProfileGroup(serde_json::from_value(value)?),
            K::SecurityRule => Self::SecurityRule(serde_json::from_value(value)?),
            K::DecryptionRule => Self::DecryptionRule(serde_json::from_value(value)?),
        })
    }

    /// The attribute bag as a JSON object, for wire payloads and output.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Check field combinations serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Address(a) if a.value.trim().is_empty() => Err("address value is empty".into()),
            Self::Service(s) if s.destination_port.trim().is_empty() => {
                Err("service destination-port is empty".into())
            }
            Self::ExternalList(e) if e.url.trim().is_empty() => Err("external list url is empty".into()),
            Self::AddressGroup(g) if !g.static_members.is_empty() && g.dynamic_filter.is_some() => {
                Err("address group cannot have both static-members and dynamic-filter".into())
            }
            _ => Ok(()),
        }
    }

    /// Substitute `{environment}` in external list URLs.
    pub fn substitute_environment(&mut self, environment: &str) {
        if let Self::ExternalList(e) = self {
            e.url = e.url.replace("{environment}", environment);
        }
    }

    // ── Canonical form ───────────────────────────────────────────────

    /// Rewrite every field into its canonical form. Idempotent.
    #[must_use]
    pub fn canonicalize(self) -> Self {
        self.canonical_form(true)
    }

    /// Canonical form without the rule defaults: empty match sets stay
    /// empty instead of widening to `any` or `application-default`. Partial
    /// records are normalized this way before merging.
    #[must_use]
    pub fn normalize(self) -> Self {
        self.canonical_form(false)
    }

    fn canonical_form(self, defaults: bool) -> Self {
        match self {
            Self::Tag(t) => Self::Tag(TagAttrs {
                color: canonical::lowercase(t.color),
                comments: canonical::text(t.comments),
            }),
            Self::Address(a) => {
                let value = match a.address_type {
                    AddressType::IpNetmask | AddressType::IpRange => canonical::address(&a.value),
                    AddressType::Fqdn => a.value.trim().to_lowercase(),
                    AddressType::IpWildcard => a.value.trim().to_owned(),
                };
                Self::Address(AddressAttrs {
                    address_type: a.address_type,
                    value,
                    description: canonical::text(a.description),
                    tags: canonical::set(a.tags),
                })
            }
            Self::Service(s) => Self::Service(ServiceAttrs {
                protocol: s.protocol,
                destination_port: canonical::ports(&s.destination_port),
                source_port: s
                    .source_port
                    .map(|p| canonical::ports(&p))
                    .filter(|p| !p.is_empty()),
                description: canonical::text(s.description),
                tags: canonical::set(s.tags),
            }),
            Self::ExternalList(e) => Self::ExternalList(ExternalListAttrs {
                list_type: e.list_type,
                url: e.url.trim().to_owned(),
                recurring: e.recurring,
                description: canonical::text(e.description),
                exceptions: canonical::set(e.exceptions),
            }),
            Self::CustomUrlCategory(c) => Self::CustomUrlCategory(CustomUrlCategoryAttrs {
                category_type: c.category_type,
                entries: canonical::set(c.entries)
                    .into_iter()
                    .map(|e| e.to_lowercase())
                    .collect(),
                description: canonical::text(c.description),
            }),
            Self::AddressGroup(g) => Self::AddressGroup(AddressGroupAttrs {
                static_members: canonical::set(g.static_members),
                dynamic_filter: canonical::text(g.dynamic_filter),
                description: canonical::text(g.description),
                tags: canonical::set(g.tags),
            }),
            Self::ServiceGroup(g) => Self::ServiceGroup(ServiceGroupAttrs {
                members: canonical::set(g.members),
                tags: canonical::set(g.tags),
            }),
            Self::ApplicationFilter(f) => Self::ApplicationFilter(ApplicationFilterAttrs {
                categories: canonical::set(f.categories),
                subcategories: canonical::set(f.subcategories),
                technologies: canonical::set(f.technologies),
                risks: canonical::set(f.risks),
                exclude: canonical::set(f.exclude),
                tags: canonical::set(f.tags),
            }),
            Self::ApplicationGroup(g) => Self::ApplicationGroup(ApplicationGroupAttrs {
                members: canonical::set(g.members),
            }),
            Self::LogForwardingProfile(p) => {
                Self::LogForwardingProfile(LogForwardingProfileAttrs {
                    description: canonical::text(p.description),
                    match_lists: p.match_lists,
                })
            }
            Self::Profile(p) => Self::Profile(ProfileAttrs {
                description: canonical::text(p.description),
                settings: p.settings,
                lists: canonical::set(p.lists),
            }),
            Self::SecurityProfileGroup(g) => Self::SecurityProfileGroup(SecurityProfileGroupAttrs {
                antivirus: canonical::text(g.antivirus),
                anti_spyware: canonical::text(g.anti_spyware),
                vulnerability: canonical::text(g.vulnerability),
                url_filtering: canonical::text(g.url_filtering),
                file_blocking: canonical::text(g.file_blocking),
                wildfire: canonical::text(g.wildfire),
            }),
            Self::SecurityRule(r) => Self::SecurityRule(SecurityRuleAttrs {
                from_zones: any_set(r.from_zones, defaults),
                to_zones: any_set(r.to_zones, defaults),
                sources: address_set(r.sources, defaults),
                destinations: address_set(r.destinations, defaults),
                source_users: any_set(r.source_users, defaults),
                applications: any_set(r.applications, defaults),
                services: service_set(r.services, defaults),
                categories: any_set(r.categories, defaults),
                profile_group: canonical::text(r.profile_group),
                log_setting: canonical::text(r.log_setting),
                tags: canonical::set(r.tags),
                group_tag: canonical::text(r.group_tag),
                description: canonical::text(r.description),
                ..r
            }),
            Self::DecryptionRule(r) => Self::DecryptionRule(DecryptionRuleAttrs {
                from_zones: any_set(r.from_zones, defaults),
                to_zones: any_set(r.to_zones, defaults),
                sources: address_set(r.sources, defaults),
                destinations: address_set(r.destinations, defaults),
                source_users: any_set(r.source_users, defaults),
                services: service_set(r.services, defaults),
                categories: any_set(r.categories, defaults),
                decryption_type: canonical::text(r.decryption_type),
                profile: canonical::text(r.profile),
                log_setting: canonical::text(r.log_setting),
                tags: canonical::set(r.tags),
                group_tag: canonical::text(r.group_tag),
                description: canonical::text(r.description),
                ..r
            }),
        }
    }

    // ── References ───────────────────────────────────────────────────

    /// Every name in this bag that may refer to another managed object.
    pub fn references(&self) -> Vec<Reference<'_>> {
        use ReferenceClass as C;

        let mut refs = Vec::new();
        match self {
            Self::Tag(_)
            | Self::ExternalList(_)
            | Self::CustomUrlCategory(_)
            | Self::LogForwardingProfile(_) => {}
            Self::Address(a) => push(&mut refs, "tags", &a.tags, TAG, C::Object),
            Self::Service(s) => push(&mut refs, "tags", &s.tags, TAG, C::Object),
            Self::AddressGroup(g) => {
                push(&mut refs, "static-members", &g.static_members, ADDRESS_MEMBER, C::Object);
                push(&mut refs, "tags", &g.tags, TAG, C::Object);
            }
            Self::ServiceGroup(g) => {
                push(&mut refs, "members", &g.members, SERVICE_MEMBER, C::Service);
                push(&mut refs, "tags", &g.tags, TAG, C::Object);
            }
            Self::ApplicationFilter(f) => push(&mut refs, "tags", &f.tags, TAG, C::Object),
            Self::ApplicationGroup(g) => {
                push(&mut refs, "members", &g.members, APPLICATION_MEMBER, C::Application);
            }
            Self::Profile(p) => push(&mut refs, "lists", &p.lists, URL_LIST, C::UrlCategory),
            Self::SecurityProfileGroup(g) => {
                let slots: [(&'static str, &Option<String>, &'static [ObjectKind]); 6] = [
                    ("antivirus", &g.antivirus, &[K::AntivirusProfile]),
                    ("anti-spyware", &g.anti_spyware, &[K::AntiSpywareProfile]),
                    ("vulnerability", &g.vulnerability, &[K::VulnerabilityProfile]),
                    ("url-filtering", &g.url_filtering, &[K::UrlFilteringProfile]),
                    ("file-blocking", &g.file_blocking, &[K::FileBlockingProfile]),
                    ("wildfire", &g.wildfire, &[K::WildfireProfile]),
                ];
                for (field, value, candidates) in slots {
                    push_opt(&mut refs, field, value, candidates, C::Profile);
                }
            }
            Self::SecurityRule(r) => {
                push(&mut refs, "sources", &r.sources, RULE_ADDRESS, C::Address);
                push(&mut refs, "destinations", &r.destinations, RULE_ADDRESS, C::Address);
                push(&mut refs, "applications", &r.applications, APPLICATION_MEMBER, C::Application);
                push(&mut refs, "services", &r.services, SERVICE_MEMBER, C::Service);
                push(&mut refs, "categories", &r.categories, URL_LIST, C::UrlCategory);
                push_opt(&mut refs, "profile-group", &r.profile_group, PROFILE_GROUP, C::Object);
                push_opt(&mut refs, "log-setting", &r.log_setting, LOG_PROFILE, C::Object);
                push(&mut refs, "tags", &r.tags, TAG, C::Object);
                push_opt(&mut refs, "group-tag", &r.group_tag, TAG, C::Object);
            }
            Self::DecryptionRule(r) => {
                push(&mut refs, "sources", &r.sources, RULE_ADDRESS, C::Address);
                push(&mut refs, "destinations", &r.destinations, RULE_ADDRESS, C::Address);
                push(&mut refs, "services", &r.services, SERVICE_MEMBER, C::Service);
                push(&mut refs, "categories", &r.categories, URL_LIST, C::UrlCategory);
                push_opt(&mut refs, "profile", &r.profile, DECRYPTION_PROFILE, C::Object);
                push_opt(&mut refs, "log-setting", &r.log_setting, LOG_PROFILE, C::Object);
                push(&mut refs, "tags", &r.tags, TAG, C::Object);
                push_opt(&mut refs, "group-tag", &r.group_tag, TAG, C::Object);
            }
        }
        refs
    }

    // ── Merge ────────────────────────────────────────────────────────

    /// Fold a second definition of the same object into this one.
    ///
    /// Set-valued fields accumulate. Scalar fields must agree; a scalar
    /// missing on one side takes the other side's value.
    pub fn merge(&mut self, other: Attributes) -> Result<(), MergeConflict> {
        match (self, other) {
            (Self::Tag(a), Self::Tag(b)) => {
                scalar("color", &mut a.color, b.color)?;
                scalar("comments", &mut a.comments, b.comments)
            }
            (Self::Address(a), Self::Address(b)) => {
                same("type", &a.address_type, &b.address_type)?;
                same("value", &a.value, &b.value)?;
                scalar("description", &mut a.description, b.description)?;
                a.tags.extend(b.tags);
                Ok(())
            }
            (Self::Service(a), Self::Service(b)) => {
                same("protocol", &a.protocol, &b.protocol)?;
                same("destination-port", &a.destination_port, &b.destination_port)?;
                scalar("source-port", &mut a.source_port, b.source_port)?;
                scalar("description", &mut a.description, b.description)?;
                a.tags.extend(b.tags);
                Ok(())
            }
            (Self::ExternalList(a), Self::ExternalList(b)) => {
                same("type", &a.list_type, &b.list_type)?;
                same("url", &a.url, &b.url)?;
                scalar("recurring", &mut a.recurring, b.recurring)?;
                scalar("description", &mut a.description, b.description)?;
                a.exceptions.extend(b.exceptions);
                Ok(())
            }
            (Self::CustomUrlCategory(a), Self::CustomUrlCategory(b)) => {
                same("type", &a.category_type, &b.category_type)?;
                scalar("description", &mut a.description, b.description)?;
                a.entries.extend(b.entries);
                Ok(())
            }
            (Self::AddressGroup(a), Self::AddressGroup(b)) => {
                scalar("dynamic-filter", &mut a.dynamic_filter, b.dynamic_filter)?;
                scalar("description", &mut a.description, b.description)?;
                a.static_members.extend(b.static_members);
                a.tags.extend(b.tags);
                if !a.static_members.is_empty() && a.dynamic_filter.is_some() {
                    return Err(MergeConflict {
                        field: "static-members",
                    });
                }
                Ok(())
            }
            (Self::ServiceGroup(a), Self::ServiceGroup(b)) => {
                a.members.extend(b.members);
                a.tags.extend(b.tags);
                Ok(())
            }
            (Self::ApplicationFilter(a), Self::ApplicationFilter(b)) => {
                a.categories.extend(b.categories);
                a.subcategories.extend(b.subcategories);
                a.technologies.extend(b.technologies);
                a.risks.extend(b.risks);
                a.exclude.extend(b.exclude);
                a.tags.extend(b.tags);
                Ok(())
            }
            (Self::ApplicationGroup(a), Self::ApplicationGroup(b)) => {
                a.members.extend(b.members);
                Ok(())
            }
            (Self::LogForwardingProfile(a), Self::LogForwardingProfile(b)) => {
                scalar("description", &mut a.description, b.description)?;
                merge_map("match-lists", &mut a.match_lists, b.match_lists)
            }
            (Self::Profile(a), Self::Profile(b)) => {
                scalar("description", &mut a.description, b.description)?;
                a.lists.extend(b.lists);
                merge_map("settings", &mut a.settings, b.settings)
            }
            (Self::SecurityProfileGroup(a), Self::SecurityProfileGroup(b)) => {
                scalar("antivirus", &mut a.antivirus, b.antivirus)?;
                scalar("anti-spyware", &mut a.anti_spyware, b.anti_spyware)?;
                scalar("vulnerability", &mut a.vulnerability, b.vulnerability)?;
                scalar("url-filtering", &mut a.url_filtering, b.url_filtering)?;
                scalar("file-blocking", &mut a.file_blocking, b.file_blocking)?;
                scalar("wildfire", &mut a.wildfire, b.wildfire)
            }
            (Self::SecurityRule(a), Self::SecurityRule(b)) => {
                same("rulebase", &a.rulebase, &b.rulebase)?;
                same("type", &a.rule_type, &b.rule_type)?;
                same("action", &a.action, &b.action)?;
                same("negate-source", &a.negate_source, &b.negate_source)?;
                same("negate-destination", &a.negate_destination, &b.negate_destination)?;
                same("log-start", &a.log_start, &b.log_start)?;
                same("log-end", &a.log_end, &b.log_end)?;
                same("disabled", &a.disabled, &b.disabled)?;
                scalar("profile-group", &mut a.profile_group, b.profile_group)?;
                scalar("log-setting", &mut a.log_setting, b.log_setting)?;
                scalar("group-tag", &mut a.group_tag, b.group_tag)?;
                scalar("description", &mut a.description, b.description)?;
                a.from_zones.extend(b.from_zones);
                a.to_zones.extend(b.to_zones);
                a.sources.extend(b.sources);
                a.destinations.extend(b.destinations);
                a.source_users.extend(b.source_users);
                a.applications.extend(b.applications);
                a.services.extend(b.services);
                a.categories.extend(b.categories);
                a.tags.extend(b.tags);
                Ok(())
            }
            (Self::DecryptionRule(a), Self::DecryptionRule(b)) => {
                same("rulebase", &a.rulebase, &b.rulebase)?;
                same("action", &a.action, &b.action)?;
                same("disabled", &a.disabled, &b.disabled)?;
                scalar("decryption-type", &mut a.decryption_type, b.decryption_type)?;
                scalar("profile", &mut a.profile, b.profile)?;
                scalar("log-setting", &mut a.log_setting, b.log_setting)?;
                scalar("group-tag", &mut a.group_tag, b.group_tag)?;
                scalar("description", &mut a.description, b.description)?;
                a.from_zones.extend(b.from_zones);
                a.to_zones.extend(b.to_zones);
                a.sources.extend(b.sources);
                a.destinations.extend(b.destinations);
                a.source_users.extend(b.source_users);
                a.services.extend(b.services);
                a.categories.extend(b.categories);
                a.tags.extend(b.tags);
                Ok(())
            }
            _ => Err(MergeConflict { field: "kind" }),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn push<'a>(
    refs: &mut Vec<Reference<'a>>,
    field: &'static str,
    items: &'a BTreeSet<String>,
    candidates: &'static [ObjectKind],
    class: ReferenceClass,
) {
    refs.extend(items.iter().map(|name| Reference {
        field,
        name: name.as_str(),
        candidates,
        class,
    }));
}

fn push_opt<'a>(
    refs: &mut Vec<Reference<'a>>,
    field: &'static str,
    item: &'a Option<String>,
    candidates: &'static [ObjectKind],
    class: ReferenceClass,
) {
    if let Some(name) = item {
        refs.push(Reference {
            field,
            name: name.as_str(),
            candidates,
            class,
        });
    }
}

/// Containing `any` collapses to `{any}`; so does empty when `defaults`.
fn any_set(values: BTreeSet<String>, defaults: bool) -> BTreeSet<String> {
    let values = canonical::set(values);
    if (defaults && values.is_empty()) || values.iter().any(|v| v.eq_ignore_ascii_case("any")) {
        BTreeSet::from(["any".to_owned()])
    } else {
        values
    }
}

/// Like [`any_set`], with IP literals reformatted.
fn address_set(values: BTreeSet<String>, defaults: bool) -> BTreeSet<String> {
    any_set(values, defaults)
        .into_iter()
        .map(|v| {
            if canonical::is_address_literal(&v) {
                canonical::address(&v)
            } else {
                v
            }
        })
        .collect()
}

/// Empty means `application-default` when `defaults`; `any` absorbs
/// everything else.
fn service_set(values: BTreeSet<String>, defaults: bool) -> BTreeSet<String> {
    let values = canonical::set(values);
    if defaults && values.is_empty() {
        BTreeSet::from(["application-default".to_owned()])
    } else if values.iter().any(|v| v.eq_ignore_ascii_case("any")) {
        BTreeSet::from(["any".to_owned()])
    } else {
        values
    }
}

fn scalar<T: PartialEq>(
    field: &'static str,
    mine: &mut Option<T>,
    theirs: Option<T>,
) -> Result<(), MergeConflict> {
    let Some(value) = theirs else {
        return Ok(());
    };
    if let Some(existing) = mine.as_ref() {
        return if *existing == value {
            Ok(())
        } else {
            Err(MergeConflict { field })
        };
    }
    *mine = Some(value);
    Ok(())
}

fn same<T: PartialEq>(field: &'static str, mine: &T, theirs: &T) -> Result<(), MergeConflict> {
    if mine == theirs {
        Ok(())
    } else {
        Err(MergeConflict { field })
    }
}

fn merge_map(
    field: &'static str,
    mine: &mut BTreeMap<String, Value>,
    theirs: BTreeMap<String, Value>,
) -> Result<(), MergeConflict> {
    for (key, value) in theirs {
        match mine.get(&key) {
            Some(existing) if *existing != value => return Err(MergeConflict { field }),
            Some(_) => {}
            None => {
                mine.insert(key, value);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(kind: ObjectKind, value: Value) -> Attributes {
        Attributes::from_value(kind, value).unwrap().canonicalize()
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Attributes::from_value(K::Address, json!({ "value": "10.0.0.1", "colour": "red" }))
            .unwrap_err();
        assert!(err.to_string().contains("colour"), "{err}");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = Attributes::from_value(K::SecurityRule, json!({ "sources": ["any"] })).unwrap_err();
        assert!(err.to_string().contains("action"), "{err}");
    }

    #[test]
    fn canonical_forms_compare_equal() {
        let a = attrs(K::Address, json!({ "value": " 10.0.0.1/32 ", "description": "" }));
        let b = attrs(K::Address, json!({ "value": "10.0.0.1" }));
        assert_eq!(a, b);

        let a = attrs(K::Service, json!({ "destination-port": "443,80, 80" }));
        let b = attrs(K::Service, json!({ "protocol": "tcp", "destination-port": "80,443" }));
        assert_eq!(a, b);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = attrs(
            K::SecurityRule,
            json!({ "action": "allow", "sources": [" 10.1.0.0/16 ", "web"], "services": [] }),
        );
        assert_eq!(once.clone().canonicalize(), once);
    }

    #[test]
    fn rule_sets_default_to_any() {
        let Attributes::SecurityRule(rule) = attrs(K::SecurityRule, json!({ "action": "deny" })) else {
            panic!("expected security rule");
        };
        assert_eq!(rule.sources, BTreeSet::from(["any".to_owned()]));
        assert_eq!(rule.services, BTreeSet::from(["application-default".to_owned()]));
        assert!(rule.log_end);
    }

    #[test]
    fn references_cover_membership_and_tags() {
        let group = attrs(
            K::AddressGroup,
            json!({ "static-members": ["web-1", "web-2"], "tags": ["prod"] }),
        );
        let refs: Vec<_> = group.references().iter().map(|r| (r.field, r.name)).collect();
        assert_eq!(
            refs,
            vec![("static-members", "web-1"), ("static-members", "web-2"), ("tags", "prod")]
        );
    }

    #[test]
    fn merge_accumulates_sets() {
        let mut a = attrs(K::AddressGroup, json!({ "static-members": ["web-1"] }));
        let b = attrs(K::AddressGroup, json!({ "static-members": ["web-2"], "description": "web" }));
        a.merge(b).unwrap();
        let Attributes::AddressGroup(group) = a else {
            panic!("expected address group");
        };
        assert_eq!(group.static_members.len(), 2);
        assert_eq!(group.description.as_deref(), Some("web"));
    }

    #[test]
    fn merged_partial_rules_keep_their_match_sets() {
        let normalized =
            |value: Value| Attributes::from_value(K::SecurityRule, value).unwrap().normalize();
        let mut a = normalized(json!({
            "action": "allow",
            "applications": ["ssl"],
            "destinations": ["web"]
        }));
        let b = normalized(json!({ "action": "allow", "sources": ["10.1.0.0/16"] }));
        a.merge(b).unwrap();
        let Attributes::SecurityRule(rule) = a.canonicalize() else {
            panic!("expected security rule");
        };
        assert_eq!(rule.applications, BTreeSet::from(["ssl".to_owned()]));
        assert_eq!(rule.destinations, BTreeSet::from(["web".to_owned()]));
        assert_eq!(rule.sources, BTreeSet::from(["10.1.0.0/16".to_owned()]));
        assert_eq!(rule.from_zones, BTreeSet::from(["any".to_owned()]));
        assert_eq!(rule.services, BTreeSet::from(["application-default".to_owned()]));
    }

    #[test]
    fn merge_rejects_conflicting_scalars() {
        let mut a = attrs(K::Address, json!({ "value": "10.0.0.1" }));
        let b = attrs(K::Address, json!({ "value": "10.0.0.2" }));
        assert_eq!(a.merge(b), Err(MergeConflict { field: "value" }));
    }

    #[test]
    fn environment_is_substituted() {
        let mut list = Attributes::from_value(
            K::ExternalList,
            json!({ "url": "https://edl.example.net/{environment}/block.txt" }),
        )
        .unwrap();
        list.substitute_environment("prod");
        let Attributes::ExternalList(list) = list else {
            panic!("expected external list");
        };
        assert_eq!(list.url, "https://edl.example.net/prod/block.txt");
    }
}
