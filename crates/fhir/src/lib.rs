//! FHIR wire/boundary support for clinical record synchronisation.
//!
//! This crate provides **wire models** and **translation helpers** for the clinical resources
//! the sync core works with:
//! - orders (`MedicationRequest`, `ServiceRequest`)
//! - tasks (`Task`)
//! - documents (`DocumentReference`)
//! - messages (`Communication`)
//!
//! This crate focuses on:
//! - lenient FHIR JSON parsing (missing fields fall back through ordered chains)
//! - translation between domain carriers and wire structs
//! - rendering domain carriers back to wire JSON without inventing sentinel values
//!
//! It does not talk to any server. Transport lives in the core crate.

pub mod communication;
pub mod datatypes;
pub mod document;
pub mod fallback;
pub mod normalizer;
pub mod order;
pub mod task;

// Re-export facades
pub use communication::Communication;
pub use document::Document;
pub use normalizer::{ClinicalRecord, Normalizer};
pub use order::Order;
pub use task::Task;

// Re-export public domain-level types
pub use communication::MessageData;
pub use datatypes::{
    DocumentStatus, MessageStatus, OrderStatus, Priority, RecordMeta, Tag, TaskStatus,
};
pub use document::{AttachmentData, DocumentData};
pub use fallback::UNKNOWN;
pub use order::{MedicationDetails, OrderData, OrderType};
pub use task::TaskData;

use clinsync_types::ResourceKind;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

/// Deserialise a wire struct from JSON, reporting the path of the first mismatching element.
pub(crate) fn parse_wire<T: DeserializeOwned>(json: &Value, label: &str) -> FhirResult<T> {
    match serde_path_to_error::deserialize::<_, T>(json) {
        Ok(parsed) => Ok(parsed),
        Err(err) => {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() {
                "<root>"
            } else {
                path.as_str()
            };
            Err(FhirError::Translation(format!(
                "{label} schema mismatch at {path}: {source}"
            )))
        }
    }
}

pub(crate) fn render_wire<T: Serialize>(wire: &T, label: &str) -> FhirResult<Value> {
    serde_json::to_value(wire)
        .map_err(|e| FhirError::Translation(format!("failed to render {label}: {e}")))
}

/// Accept a missing `resourceType`, or one belonging to `kind`.
pub(crate) fn check_resource_type(
    resource_type: Option<&str>,
    kind: ResourceKind,
) -> FhirResult<()> {
    match resource_type {
        None => Ok(()),
        Some(rt) if kind.resource_types().contains(&rt) => Ok(()),
        Some(rt) => Err(FhirError::InvalidInput(format!(
            "resourceType {rt} is not a {kind} resource (expected {})",
            kind.resource_types().join(" or ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_mismatch_reports_path() {
        let err = Order::parse(&json!({"resourceType": "MedicationRequest", "note": [{"text": 4}]}))
            .expect_err("wrong type");
        let FhirError::Translation(message) = err else {
            panic!("expected a translation error");
        };
        assert!(message.contains("note[0].text"), "{message}");
    }

    #[test]
    fn resource_type_must_match_kind() {
        assert!(check_resource_type(None, ResourceKind::Task).is_ok());
        assert!(check_resource_type(Some("ServiceRequest"), ResourceKind::Order).is_ok());
        assert!(matches!(
            check_resource_type(Some("Patient"), ResourceKind::Document),
            Err(FhirError::InvalidInput(_))
        ));
    }
}
