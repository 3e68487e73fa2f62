// ── Domain model ──
//
// Typed object definitions shared by every stage of a reconciliation run.

pub mod attributes;
pub mod canonical;
pub mod catalog;
pub mod object;
pub mod scope;

pub use attributes::{
    AddressAttrs, AddressGroupAttrs, AddressType, ApplicationFilterAttrs, ApplicationGroupAttrs,
    Attributes, CustomUrlCategoryAttrs, DecryptionRuleAttrs, ExternalListAttrs,
    LogForwardingProfileAttrs, MergeConflict, ProfileAttrs, Reference, ReferenceClass, RuleAction,
    SecurityProfileGroupAttrs, SecurityRuleAttrs, ServiceAttrs, ServiceGroupAttrs, TagAttrs,
};
pub use catalog::{PredefinedCatalog, Resolution, Unresolved, dependencies, resolve};
pub use object::{LiveObject, ObjectDefinition, ObjectKind, ObjectRef};
pub use scope::{DeploymentScope, location_label};
