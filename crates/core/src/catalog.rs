//! Operation Catalog.
//!
//! Static, table-driven declaration of what a batch may change for each resource kind: the
//! editable fields with their value domains, and the status that `activate` and `deactivate`
//! write. The executor only ever looks kinds up here, so supporting a new kind means registering
//! a new [`KindProfile`].

use crate::batch::OperationType;
use crate::constants::STATUS_FIELD;
use crate::{SyncError, SyncResult};
use chrono::NaiveDate;
use clinsync_types::ResourceKind;
use fhir::{DocumentStatus, MessageStatus, OrderStatus, Priority, TaskStatus};
use serde_json::Value;
use std::collections::BTreeMap;

const REQUEST_INTENTS: &[&str] = &[
    "proposal",
    "plan",
    "directive",
    "order",
    "original-order",
    "reflex-order",
    "filler-order",
    "instance-order",
    "option",
];

const COMPOSITION_STATUSES: &[&str] = &["preliminary", "final", "amended", "entered-in-error"];

/// The set of values a field accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDomain {
    /// One of a closed list of codes.
    Codes(&'static [&'static str]),
    /// Any non-blank string.
    FreeText,
    /// A calendar date, `YYYY-MM-DD`.
    Date,
    /// A non-negative integer.
    Count,
}

impl ValueDomain {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueDomain::Codes(codes) => value.as_str().is_some_and(|v| codes.contains(&v)),
            ValueDomain::FreeText => value.as_str().is_some_and(|v| !v.trim().is_empty()),
            ValueDomain::Date => value.as_str().is_some_and(|v| {
                v.len() == 10 && NaiveDate::parse_from_str(v, "%Y-%m-%d").is_ok()
            }),
            ValueDomain::Count => value.as_u64().is_some(),
        }
    }

    /// Short description used in validation messages and field listings.
    pub fn describe(&self) -> String {
        match self {
            ValueDomain::Codes(codes) => format!("one of {}", codes.join(", ")),
            ValueDomain::FreeText => "non-empty text".to_string(),
            ValueDomain::Date => "a date (YYYY-MM-DD)".to_string(),
            ValueDomain::Count => "a non-negative integer".to_string(),
        }
    }
}

/// Additional per-field check applied after the domain check.
pub type ExtraValidator = fn(&Value) -> bool;

/// One editable field of a resource kind.
#[derive(Clone, Copy)]
pub struct FieldSpec {
    /// Dotted path into the wire resource.
    pub path: &'static str,
    pub label: &'static str,
    pub domain: ValueDomain,
    pub extra: Option<ExtraValidator>,
    /// FHIR resource types the field exists on; empty means every type of the kind.
    pub resource_types: &'static [&'static str],
}

impl FieldSpec {
    pub fn new(path: &'static str, label: &'static str, domain: ValueDomain) -> Self {
        Self {
            path,
            label,
            domain,
            extra: None,
            resource_types: &[],
        }
    }

    /// Restrict the field to some of the kind's resource types.
    pub fn only_for(mut self, resource_types: &'static [&'static str]) -> Self {
        self.resource_types = resource_types;
        self
    }

    /// Whether the field exists on a resource of `resource_type`.
    ///
    /// An unrestricted field applies everywhere. A restricted field needs a matching type.
    pub fn applies_to(&self, resource_type: Option<&str>) -> bool {
        self.resource_types.is_empty()
            || resource_type.is_some_and(|rt| self.resource_types.contains(&rt))
    }

    pub fn with_extra(mut self, extra: ExtraValidator) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Whether `value` satisfies the domain and any extra validator.
    pub fn validate(&self, value: &Value) -> bool {
        self.domain.accepts(value) && self.extra.map_or(true, |check| check(value))
    }
}

impl std::fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("path", &self.path)
            .field("label", &self.label)
            .field("domain", &self.domain)
            .field("extra", &self.extra.is_some())
            .field("resource_types", &self.resource_types)
            .finish()
    }
}

/// Everything the catalog declares for one resource kind.
#[derive(Clone, Debug)]
pub struct KindProfile {
    pub kind: ResourceKind,
    pub fields: Vec<FieldSpec>,
    pub activate_status: &'static str,
    pub deactivate_status: &'static str,
}

impl KindProfile {
    pub fn field(&self, path: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.path == path)
    }

    /// Fixed status written by `operation`, if it writes one.
    pub fn status_for(&self, operation: OperationType) -> Option<&'static str> {
        match operation {
            OperationType::Activate => Some(self.activate_status),
            OperationType::Deactivate => Some(self.deactivate_status),
            _ => None,
        }
    }
}

fn positive(value: &Value) -> bool {
    value.as_u64().is_some_and(|n| n >= 1)
}

fn order_profile() -> KindProfile {
    KindProfile {
        kind: ResourceKind::Order,
        fields: vec![
            FieldSpec::new(STATUS_FIELD, "Status", ValueDomain::Codes(OrderStatus::CODES)),
            FieldSpec::new("priority", "Priority", ValueDomain::Codes(Priority::CODES)),
            FieldSpec::new("intent", "Intent", ValueDomain::Codes(REQUEST_INTENTS)),
            FieldSpec::new("medication.text", "Medication", ValueDomain::FreeText)
                .only_for(&["MedicationRequest"]),
            FieldSpec::new("requester.display", "Requester", ValueDomain::FreeText),
            FieldSpec::new("authoredOn", "Authored on", ValueDomain::Date),
        ],
        activate_status: "active",
        deactivate_status: "on-hold",
    }
}

fn task_profile() -> KindProfile {
    KindProfile {
        kind: ResourceKind::Task,
        fields: vec![
            FieldSpec::new(STATUS_FIELD, "Status", ValueDomain::Codes(TaskStatus::CODES)),
            FieldSpec::new("priority", "Priority", ValueDomain::Codes(Priority::CODES)),
            FieldSpec::new("description", "Description", ValueDomain::FreeText),
            FieldSpec::new("owner.display", "Owner", ValueDomain::FreeText),
            FieldSpec::new("restriction.period.end", "Due date", ValueDomain::Date),
            FieldSpec::new("restriction.repetitions", "Repetitions", ValueDomain::Count)
                .with_extra(positive),
        ],
        activate_status: "in-progress",
        deactivate_status: "on-hold",
    }
}

fn document_profile() -> KindProfile {
    KindProfile {
        kind: ResourceKind::Document,
        fields: vec![
            FieldSpec::new(
                STATUS_FIELD,
                "Status",
                ValueDomain::Codes(DocumentStatus::CODES),
            ),
            FieldSpec::new(
                "docStatus",
                "Document status",
                ValueDomain::Codes(COMPOSITION_STATUSES),
            ),
            FieldSpec::new("description", "Description", ValueDomain::FreeText),
            FieldSpec::new("type.text", "Document type", ValueDomain::FreeText),
        ],
        activate_status: "current",
        deactivate_status: "superseded",
    }
}

fn message_profile() -> KindProfile {
    KindProfile {
        kind: ResourceKind::Message,
        fields: vec![
            FieldSpec::new(STATUS_FIELD, "Status", ValueDomain::Codes(MessageStatus::CODES)),
            FieldSpec::new("priority", "Priority", ValueDomain::Codes(Priority::CODES)),
            FieldSpec::new("topic.text", "Topic", ValueDomain::FreeText),
        ],
        activate_status: "in-progress",
        deactivate_status: "on-hold",
    }
}

/// Per-kind field and status declarations.
#[derive(Clone, Debug)]
pub struct OperationCatalog {
    profiles: BTreeMap<ResourceKind, KindProfile>,
}

impl OperationCatalog {
    /// A catalog with no kinds registered.
    pub fn empty() -> Self {
        Self {
            profiles: BTreeMap::new(),
        }
    }

    /// The catalog for order, task, document and message resources.
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        for profile in [
            order_profile(),
            task_profile(),
            document_profile(),
            message_profile(),
        ] {
            catalog.register(profile);
        }
        catalog
    }

    /// Register (or replace) the profile for `profile.kind`, returning any replaced profile.
    pub fn register(&mut self, profile: KindProfile) -> Option<KindProfile> {
        self.profiles.insert(profile.kind, profile)
    }

    /// # Errors
    ///
    /// Returns [`SyncError::UnknownResourceKind`] if no profile is registered for `kind`.
    pub fn profile(&self, kind: ResourceKind) -> SyncResult<&KindProfile> {
        self.profiles
            .get(&kind)
            .ok_or(SyncError::UnknownResourceKind(kind))
    }

    /// Editable fields of `kind`, in declaration order.
    pub fn fields_for(&self, kind: ResourceKind) -> SyncResult<&[FieldSpec]> {
        Ok(&self.profile(kind)?.fields)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.profiles.keys().copied()
    }
}

impl Default for OperationCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standard_catalog_covers_every_kind() {
        let catalog = OperationCatalog::standard();
        for kind in ResourceKind::ALL {
            let profile = catalog.profile(kind).expect("profile");
            assert!(profile.field(STATUS_FIELD).is_some(), "{kind} has no status field");
        }
    }

    #[test]
    fn order_status_domain_is_closed() {
        let catalog = OperationCatalog::standard();
        let status = catalog
            .profile(ResourceKind::Order)
            .ok()
            .and_then(|p| p.field(STATUS_FIELD))
            .expect("status field");
        for code in ["draft", "active", "on-hold", "revoked", "completed", "entered-in-error"] {
            assert!(status.validate(&json!(code)), "{code}");
        }
        assert!(!status.validate(&json!("stopped")));
        assert!(!status.validate(&json!(1)));
    }

    #[test]
    fn medication_field_only_applies_to_medication_orders() {
        let catalog = OperationCatalog::standard();
        let medication = catalog
            .profile(ResourceKind::Order)
            .ok()
            .and_then(|p| p.field("medication.text"))
            .expect("medication field");
        assert!(medication.applies_to(Some("MedicationRequest")));
        assert!(!medication.applies_to(Some("ServiceRequest")));
        assert!(!medication.applies_to(None));

        let priority = catalog
            .profile(ResourceKind::Order)
            .ok()
            .and_then(|p| p.field("priority"))
            .expect("priority field");
        assert!(priority.applies_to(Some("ServiceRequest")));
        assert!(priority.applies_to(None));
    }

    #[test]
    fn value_domains() {
        assert!(ValueDomain::FreeText.accepts(&json!("note")));
        assert!(!ValueDomain::FreeText.accepts(&json!("  ")));
        assert!(ValueDomain::Date.accepts(&json!("2024-02-29")));
        assert!(!ValueDomain::Date.accepts(&json!("2023-02-29")));
        assert!(!ValueDomain::Date.accepts(&json!("2024-2-9")));
        assert!(ValueDomain::Count.accepts(&json!(0)));
        assert!(!ValueDomain::Count.accepts(&json!(-1)));
        assert!(!ValueDomain::Count.accepts(&json!("3")));
    }

    #[test]
    fn extra_validator_runs_after_domain() {
        let catalog = OperationCatalog::standard();
        let reps = catalog
            .profile(ResourceKind::Task)
            .ok()
            .and_then(|p| p.field("restriction.repetitions"))
            .expect("repetitions field");
        assert!(reps.validate(&json!(2)));
        assert!(!reps.validate(&json!(0)));
    }

    #[test]
    fn unregistered_kind_is_an_error() {
        let mut catalog = OperationCatalog::empty();
        assert!(matches!(
            catalog.fields_for(ResourceKind::Task),
            Err(SyncError::UnknownResourceKind(ResourceKind::Task))
        ));
        assert!(catalog.register(task_profile()).is_none());
        assert_eq!(catalog.kinds().collect::<Vec<_>>(), vec![ResourceKind::Task]);
    }

    #[test]
    fn activate_and_deactivate_targets() {
        let catalog = OperationCatalog::standard();
        let order = catalog.profile(ResourceKind::Order).expect("order");
        assert_eq!(order.status_for(OperationType::Activate), Some("active"));
        assert_eq!(order.status_for(OperationType::Deactivate), Some("on-hold"));
        assert_eq!(order.status_for(OperationType::Archive), None);
        let doc = catalog.profile(ResourceKind::Document).expect("document");
        assert_eq!(doc.status_for(OperationType::Deactivate), Some("superseded"));
    }
}
