//! Kind-dispatched normalisation between wire JSON and domain objects.

use crate::communication::{Communication, MessageData};
use crate::datatypes::RecordMeta;
use crate::document::{Document, DocumentData};
use crate::order::{Order, OrderData};
use crate::task::{Task, TaskData};
use crate::{FhirError, FhirResult};
use clinsync_types::ResourceKind;
use serde_json::Value;

/// A normalised clinical record of any supported kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClinicalRecord {
    Order(OrderData),
    Task(TaskData),
    Document(DocumentData),
    Message(MessageData),
}

impl ClinicalRecord {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ClinicalRecord::Order(_) => ResourceKind::Order,
            ClinicalRecord::Task(_) => ResourceKind::Task,
            ClinicalRecord::Document(_) => ResourceKind::Document,
            ClinicalRecord::Message(_) => ResourceKind::Message,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            ClinicalRecord::Order(o) => o.id.as_deref(),
            ClinicalRecord::Task(t) => t.id.as_deref(),
            ClinicalRecord::Document(d) => d.id.as_deref(),
            ClinicalRecord::Message(m) => m.id.as_deref(),
        }
    }

    /// Status code as it appears on the wire.
    pub fn status_code(&self) -> &str {
        match self {
            ClinicalRecord::Order(o) => o.status.as_str(),
            ClinicalRecord::Task(t) => t.status.as_str(),
            ClinicalRecord::Document(d) => d.status.as_str(),
            ClinicalRecord::Message(m) => m.status.as_str(),
        }
    }

    pub fn meta(&self) -> &RecordMeta {
        match self {
            ClinicalRecord::Order(o) => &o.meta,
            ClinicalRecord::Task(t) => &t.meta,
            ClinicalRecord::Document(d) => &d.meta,
            ClinicalRecord::Message(m) => &m.meta,
        }
    }

    /// One-line human summary used by list views.
    pub fn summary(&self) -> String {
        match self {
            ClinicalRecord::Order(o) => match &o.medication_details {
                Some(med) => [med.name.as_str(), med.dosage.as_str(), med.frequency.as_str()]
                    .iter()
                    .filter(|part| !part.is_empty())
                    .copied()
                    .collect::<Vec<_>>()
                    .join(" "),
                None => o.service.clone().unwrap_or_else(|| o.order_type.as_str().to_string()),
            },
            ClinicalRecord::Task(t) => t.description.clone(),
            ClinicalRecord::Document(d) => d.document_type.clone(),
            ClinicalRecord::Message(m) => {
                if m.body.is_empty() {
                    m.category.clone()
                } else {
                    format!("{}: {}", m.category, m.body)
                }
            }
        }
    }
}

/// Kind-dispatched resource normaliser.
pub struct Normalizer;

impl Normalizer {
    /// Normalise wire JSON into the domain object for `kind`.
    ///
    /// Missing fields fall back to chain defaults and never fail.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if the JSON is not an object of a resource type belonging to
    /// `kind`, or if an element has an unexpected JSON type.
    pub fn to_domain(kind: ResourceKind, json: &Value) -> FhirResult<ClinicalRecord> {
        if !json.is_object() {
            return Err(FhirError::InvalidInput(format!(
                "{kind} resource must be a JSON object"
            )));
        }
        Ok(match kind {
            ResourceKind::Order => ClinicalRecord::Order(Order::parse(json)?),
            ResourceKind::Task => ClinicalRecord::Task(Task::parse(json)?),
            ResourceKind::Document => ClinicalRecord::Document(Document::parse(json)?),
            ResourceKind::Message => ClinicalRecord::Message(Communication::parse(json)?),
        })
    }

    /// Render a domain object back into wire JSON.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] if `record` is not of `kind`.
    pub fn to_wire(kind: ResourceKind, record: &ClinicalRecord) -> FhirResult<Value> {
        if record.kind() != kind {
            return Err(FhirError::InvalidInput(format!(
                "expected a {kind} record, got a {}",
                record.kind()
            )));
        }
        match record {
            ClinicalRecord::Order(o) => Order::render(o),
            ClinicalRecord::Task(t) => Task::render(t),
            ClinicalRecord::Document(d) => Document::render(d),
            ClinicalRecord::Message(m) => Communication::render(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dispatches_on_kind() {
        let record = Normalizer::to_domain(
            ResourceKind::Task,
            &json!({"resourceType": "Task", "id": "t1", "status": "on-hold"}),
        )
        .expect("normalise");
        assert_eq!(record.kind(), ResourceKind::Task);
        assert_eq!(record.id(), Some("t1"));
        assert_eq!(record.status_code(), "on-hold");
        assert_eq!(record.summary(), "Unknown");
    }

    #[test]
    fn empty_object_normalises_to_defaults() {
        let record = Normalizer::to_domain(ResourceKind::Message, &json!({})).expect("normalise");
        let ClinicalRecord::Message(message) = record else {
            panic!("expected a message");
        };
        assert_eq!(message.category, "Unknown");
        assert_eq!(message.body, "");
        assert_eq!(message.status.as_str(), "unknown");
    }

    #[test]
    fn rejects_non_objects_and_foreign_types() {
        assert!(Normalizer::to_domain(ResourceKind::Order, &json!([1, 2])).is_err());
        assert!(matches!(
            Normalizer::to_domain(ResourceKind::Order, &json!({"resourceType": "Task"})),
            Err(FhirError::InvalidInput(_))
        ));
    }

    #[test]
    fn to_wire_rejects_kind_mismatch() {
        let record =
            Normalizer::to_domain(ResourceKind::Document, &json!({"status": "current"}))
                .expect("normalise");
        assert!(matches!(
            Normalizer::to_wire(ResourceKind::Order, &record),
            Err(FhirError::InvalidInput(_))
        ));
        let wire = Normalizer::to_wire(ResourceKind::Document, &record).expect("render");
        assert_eq!(wire["resourceType"], "DocumentReference");
        assert_eq!(wire["status"], "current");
    }

    #[test]
    fn order_summary_joins_medication_parts() {
        let record = Normalizer::to_domain(
            ResourceKind::Order,
            &json!({
                "resourceType": "MedicationRequest",
                "status": "active",
                "medicationCodeableConcept": {"text": "Amoxicillin"},
                "dosageInstruction": [{
                    "doseAndRate": [{"doseQuantity": {"value": 500, "unit": "mg"}}],
                    "timing": {"repeat": {"frequency": 3, "period": 1, "periodUnit": "d"}}
                }]
            }),
        )
        .expect("normalise");
        assert_eq!(record.summary(), "Amoxicillin 500 mg 3 times per day");
    }
}
