//! FHIR-aligned order wire models and translation helpers.
//!
//! Orders arrive as either `MedicationRequest` or `ServiceRequest`. Both shapes are read through
//! one lenient wire struct and projected onto [`OrderData`], whose `order_type` records which
//! shape the record came from.
//!
//! Medication details are assembled from fallback chains:
//! - name: `medication.text` → `medication.coding[0].display` → `medicationCodeableConcept.text`
//!   → its `coding[0].display` → referenced medication display → first contained resource's
//!   `code` text/display → leading word run of the free-text dosage instruction
//! - dosage and frequency: see [`crate::fallback`]

use crate::datatypes::{
    Annotation, CodeableConcept, Coding, Dosage, Meta, OrderStatus, Priority, RecordMeta,
    Reference, Timing, MISSING_STATUS,
};
use crate::fallback::{
    concept_label, dosage_display, first_present, frequency_display,
    optional_concept_label, party_label, present, target_label, unless_sentinel, Extractor,
    UNKNOWN,
};
use crate::{check_resource_type, parse_wire, render_wire, FhirResult};
use clinsync_types::ResourceKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

// ============================================================================
// Public domain-level types
// ============================================================================

/// Which wire shape an order was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderType {
    /// A `MedicationRequest`.
    Medication,
    /// A `ServiceRequest` (labs, imaging, referrals).
    Service,
}

impl OrderType {
    fn resource_type(self) -> &'static str {
        match self {
            OrderType::Medication => "MedicationRequest",
            OrderType::Service => "ServiceRequest",
        }
    }

    /// Returns a lowercase label for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Medication => "medication",
            OrderType::Service => "service",
        }
    }
}

/// Display-ready medication details for a medication order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MedicationDetails {
    /// Medication display name, or [`UNKNOWN`].
    pub name: String,

    /// Dose string, or empty.
    pub dosage: String,

    /// Frequency string, or empty.
    pub frequency: String,

    /// Route of administration.
    pub route: Option<String>,
}

/// Domain-level carrier for an order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderData {
    /// Upstream resource id.
    pub id: Option<String>,

    /// Medication or service order.
    pub order_type: OrderType,

    /// Current status.
    pub status: OrderStatus,

    /// Request intent (proposal, plan, order, ...).
    pub intent: Option<String>,

    /// Request priority.
    pub priority: Option<Priority>,

    /// First category label.
    pub category: Option<String>,

    /// Present for medication orders.
    pub medication_details: Option<MedicationDetails>,

    /// Requested service label, present for service orders.
    pub service: Option<String>,

    /// Patient reference.
    pub subject: Option<String>,

    /// Requesting clinician.
    pub requester: Option<String>,

    /// When the order was written.
    pub authored_on: Option<String>,

    /// Free-text notes.
    pub notes: Vec<String>,

    /// Version and tags.
    pub meta: RecordMeta,
}

// ============================================================================
// Public Order operations
// ============================================================================

/// Order resource operations.
///
/// This is a zero-sized type used for namespacing order-related operations.
/// All methods are associated functions.
pub struct Order;

impl Order {
    /// Parse an order from its wire JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if:
    /// - `resourceType` is present but is neither `MedicationRequest` nor `ServiceRequest`,
    /// - any element has an unexpected JSON type.
    ///
    /// Missing optional elements never fail; they resolve to sentinels.
    pub fn parse(json: &Value) -> FhirResult<OrderData> {
        let wire: OrderWire = parse_wire(json, "Order")?;
        check_resource_type(wire.resource_type.as_deref(), ResourceKind::Order)?;
        Ok(wire_to_domain(&wire))
    }

    /// Render an order as wire JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if serialisation fails.
    pub fn render(data: &OrderData) -> FhirResult<Value> {
        render_wire(&domain_to_wire(data), "order")
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct MedicationElement {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    coding: Vec<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reference: Option<Reference>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContainedResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<CodeableConcept>,
}

/// Lenient wire representation covering MedicationRequest and ServiceRequest.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<OrderStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    category: Vec<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    medication: Option<MedicationElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    medication_codeable_concept: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    medication_reference: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    contained: Vec<ContainedResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dosage_instruction: Vec<Dosage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requester: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authored_on: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    note: Vec<Annotation>,
}

// ============================================================================
// Medication name chain (internal)
// ============================================================================

fn medication_text(wire: &OrderWire) -> Option<String> {
    present(wire.medication.as_ref()?.text.as_deref())
}

fn medication_coding_display(wire: &OrderWire) -> Option<String> {
    present(wire.medication.as_ref()?.coding.first()?.display.as_deref())
}

fn legacy_concept_text(wire: &OrderWire) -> Option<String> {
    present(wire.medication_codeable_concept.as_ref()?.text.as_deref())
}

fn legacy_concept_display(wire: &OrderWire) -> Option<String> {
    present(
        wire.medication_codeable_concept
            .as_ref()?
            .coding
            .first()?
            .display
            .as_deref(),
    )
}

fn referenced_medication_display(wire: &OrderWire) -> Option<String> {
    present(wire.medication_reference.as_ref()?.display.as_deref()).or_else(|| {
        present(
            wire.medication
                .as_ref()?
                .reference
                .as_ref()?
                .display
                .as_deref(),
        )
    })
}

fn contained_code_label(wire: &OrderWire) -> Option<String> {
    concept_label(wire.contained.first()?.code.as_ref()?)
}

fn leading_words() -> Option<&'static Regex> {
    static LEADING_WORDS: OnceLock<Option<Regex>> = OnceLock::new();
    LEADING_WORDS
        .get_or_init(|| Regex::new(r"^\s*([A-Za-z][A-Za-z-]*(?:\s+[A-Za-z][A-Za-z-]*)*)\s+\d").ok())
        .as_ref()
}

fn dosage_instruction_words(wire: &OrderWire) -> Option<String> {
    let text = wire.dosage_instruction.first()?.text.as_deref()?;
    let captures = leading_words()?.captures(text)?;
    present(captures.get(1).map(|m| m.as_str()))
}

/// Human-authored text first, coded display next, free-text instruction last.
const MEDICATION_NAME_CHAIN: &[Extractor<OrderWire>] = &[
    medication_text,
    medication_coding_display,
    legacy_concept_text,
    legacy_concept_display,
    referenced_medication_display,
    contained_code_label,
    dosage_instruction_words,
];

fn service_code_label(wire: &OrderWire) -> Option<String> {
    optional_concept_label(wire.code.as_ref())
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn order_type(wire: &OrderWire) -> OrderType {
    match wire.resource_type.as_deref() {
        Some("ServiceRequest") => OrderType::Service,
        _ => OrderType::Medication,
    }
}

fn wire_to_domain(wire: &OrderWire) -> OrderData {
    let order_type = order_type(wire);

    let (medication_details, service) = match order_type {
        OrderType::Medication => {
            let dosage = wire.dosage_instruction.first();
            let details = MedicationDetails {
                name: first_present(wire, MEDICATION_NAME_CHAIN)
                    .unwrap_or_else(|| UNKNOWN.to_string()),
                dosage: dosage_display(dosage),
                frequency: frequency_display(dosage.and_then(|d| d.timing.as_ref())),
                route: optional_concept_label(dosage.and_then(|d| d.route.as_ref())),
            };
            (Some(details), None)
        }
        OrderType::Service => (
            None,
            Some(service_code_label(wire).unwrap_or_else(|| UNKNOWN.to_string())),
        ),
    };

    OrderData {
        id: present(wire.id.as_deref()),
        order_type,
        status: wire
            .status
            .clone()
            .unwrap_or_else(|| OrderStatus::from_code(MISSING_STATUS)),
        intent: present(wire.intent.as_deref()),
        priority: wire.priority.clone(),
        category: optional_concept_label(wire.category.first()),
        medication_details,
        service,
        subject: target_label(wire.subject.as_ref()),
        requester: party_label(wire.requester.as_ref()),
        authored_on: present(wire.authored_on.as_deref()),
        notes: wire
            .note
            .iter()
            .filter_map(|n| present(n.text.as_deref()))
            .collect(),
        meta: RecordMeta::from_wire(wire.meta.as_ref()),
    }
}

fn medication_dosage_to_wire(details: &MedicationDetails) -> Option<Dosage> {
    let text = unless_sentinel(&details.dosage, "");
    let frequency = unless_sentinel(&details.frequency, "");
    if text.is_none() && frequency.is_none() && details.route.is_none() {
        return None;
    }
    Some(Dosage {
        text,
        timing: frequency.map(|f| Timing {
            repeat: None,
            code: Some(CodeableConcept::from_text(f)),
        }),
        route: details.route.clone().map(CodeableConcept::from_text),
        dose_and_rate: Vec::new(),
    })
}

fn domain_to_wire(data: &OrderData) -> OrderWire {
    let mut wire = OrderWire {
        resource_type: Some(data.order_type.resource_type().to_string()),
        id: data.id.clone(),
        meta: data.meta.to_wire(),
        status: Some(data.status.clone()),
        intent: data.intent.clone(),
        priority: data.priority.clone(),
        category: data
            .category
            .iter()
            .map(|c| CodeableConcept::from_text(c.clone()))
            .collect(),
        subject: data.subject.clone().map(|reference| Reference {
            reference: Some(reference),
            display: None,
        }),
        requester: data.requester.clone().map(|display| Reference {
            reference: None,
            display: Some(display),
        }),
        authored_on: data.authored_on.clone(),
        note: data
            .notes
            .iter()
            .map(|text| Annotation {
                text: Some(text.clone()),
                time: None,
            })
            .collect(),
        ..OrderWire::default()
    };

    if let Some(details) = &data.medication_details {
        wire.medication = unless_sentinel(&details.name, UNKNOWN).map(|name| {
            MedicationElement {
                text: Some(name),
                ..MedicationElement::default()
            }
        });
        wire.dosage_instruction = medication_dosage_to_wire(details).into_iter().collect();
    }
    if let Some(service) = &data.service {
        wire.code = unless_sentinel(service, UNKNOWN).map(CodeableConcept::from_text);
    }

    wire
}
