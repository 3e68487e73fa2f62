// ── Predefined names and reference resolution ──

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::attributes::{Attributes, Reference, ReferenceClass};
use super::canonical;
use super::object::ObjectRef;

/// Names the device predefines, which never need a managed object.
///
/// With `open_applications` / `open_url_categories` set, any unresolved
/// application or URL category name is assumed to be predefined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PredefinedCatalog {
    pub applications: BTreeSet<String>,
    pub services: BTreeSet<String>,
    pub url_categories: BTreeSet<String>,
    pub profiles: BTreeSet<String>,
    pub open_applications: bool,
    pub open_url_categories: bool,
}

impl Default for PredefinedCatalog {
    fn default() -> Self {
        Self {
            applications: BTreeSet::new(),
            services: ["service-http", "service-https"]
                .into_iter()
                .map(String::from)
                .collect(),
            url_categories: BTreeSet::new(),
            profiles: ["default", "strict"].into_iter().map(String::from).collect(),
            open_applications: true,
            open_url_categories: true,
        }
    }
}

impl PredefinedCatalog {
    /// A catalog that accepts only the listed applications and URL categories.
    pub fn closed(
        applications: impl IntoIterator<Item = String>,
        url_categories: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            applications: applications.into_iter().collect(),
            url_categories: url_categories.into_iter().collect(),
            open_applications: false,
            open_url_categories: false,
            ..Self::default()
        }
    }

    /// `true` if `name` is satisfied without any managed object.
    pub fn is_predefined(&self, class: ReferenceClass, name: &str) -> bool {
        let any = name.eq_ignore_ascii_case("any");
        match class {
            ReferenceClass::Object => false,
            ReferenceClass::Address => any || canonical::is_address_literal(name),
            ReferenceClass::Service => {
                any || name == "application-default" || self.services.contains(name)
            }
            ReferenceClass::Application => any || self.applications.contains(name),
            ReferenceClass::UrlCategory => any || self.url_categories.contains(name),
            ReferenceClass::Profile => self.profiles.contains(name),
        }
    }

    /// Whether an unresolved name of this class may be left to the device.
    pub fn tolerates_unknown(&self, class: ReferenceClass) -> bool {
        match class {
            ReferenceClass::Application => self.open_applications,
            ReferenceClass::UrlCategory => self.open_url_categories,
            _ => false,
        }
    }
}

/// Outcome of resolving one reference against a set of known objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The name is a managed object.
    Object(ObjectRef),
    /// The name is predefined on the device (or a literal).
    Predefined,
    /// Nothing matched.
    Unresolved,
}

/// Resolve `reference` by trying each candidate kind in order.
pub fn resolve(
    reference: &Reference<'_>,
    catalog: &PredefinedCatalog,
    exists: impl Fn(&ObjectRef) -> bool,
) -> Resolution {
    if catalog.is_predefined(reference.class, reference.name) {
        return Resolution::Predefined;
    }
    for &kind in reference.candidates {
        let candidate = ObjectRef::new(kind, reference.name);
        if exists(&candidate) {
            return Resolution::Object(candidate);
        }
    }
    if catalog.tolerates_unknown(reference.class) {
        Resolution::Predefined
    } else {
        Resolution::Unresolved
    }
}

/// Names of `attributes` that resolved to nothing, as `(field, name)`.
pub type Unresolved = Vec<(&'static str, String)>;

/// Resolve every reference of `attributes`, splitting managed objects from
/// names that matched nothing.
pub fn dependencies(
    attributes: &Attributes,
    catalog: &PredefinedCatalog,
    exists: impl Fn(&ObjectRef) -> bool,
) -> (BTreeSet<ObjectRef>, Unresolved) {
    let mut resolved = BTreeSet::new();
    let mut unresolved = Vec::new();
    for reference in attributes.references() {
        match resolve(&reference, catalog, &exists) {
            Resolution::Object(object) => {
                resolved.insert(object);
            }
            Resolution::Predefined => {}
            Resolution::Unresolved => unresolved.push((reference.field, reference.name.to_owned())),
        }
    }
    (resolved, unresolved)
}
