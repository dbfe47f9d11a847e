//! FHIR-aligned communication (message) wire models and translation helpers.
//!
//! Messages are `Communication` resources exchanged between care team members. The message
//! body falls back from the first string payload to an attachment title and then to the first
//! note.

use crate::datatypes::{
    Annotation, Attachment, CodeableConcept, Meta, MessageStatus, Priority, RecordMeta,
    Reference, MISSING_STATUS,
};
use crate::fallback::{
    concept_label, first_present, optional_concept_label, party_label, present, target_label,
    unless_sentinel, Extractor, UNKNOWN,
};
use crate::{check_resource_type, parse_wire, render_wire, FhirResult};
use clinsync_types::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Domain-level carrier for a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageData {
    pub id: Option<String>,
    pub status: MessageStatus,
    pub priority: Option<Priority>,

    /// Message category label, or [`UNKNOWN`].
    pub category: String,

    pub subject: Option<String>,
    pub topic: Option<String>,
    pub sender: Option<String>,
    pub recipients: Vec<String>,
    pub sent: Option<String>,
    pub received: Option<String>,

    /// Message text, or empty.
    pub body: String,

    pub meta: RecordMeta,
}

/// Communication resource operations.
pub struct Communication;

impl Communication {
    /// Parse a message from its wire JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if `resourceType` is not `Communication` or an element has
    /// an unexpected JSON type.
    pub fn parse(json: &Value) -> FhirResult<MessageData> {
        let wire: CommunicationWire = parse_wire(json, "Message")?;
        check_resource_type(wire.resource_type.as_deref(), ResourceKind::Message)?;
        Ok(wire_to_domain(&wire))
    }

    /// Render a message as wire JSON.
    pub fn render(data: &MessageData) -> FhirResult<Value> {
        render_wire(&domain_to_wire(data), "message")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_attachment: Option<Attachment>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommunicationWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    category: Vec<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sender: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    recipient: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    received: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    payload: Vec<Payload>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    note: Vec<Annotation>,
}

fn first_category(wire: &CommunicationWire) -> Option<String> {
    concept_label(wire.category.first()?)
}

fn payload_string(wire: &CommunicationWire) -> Option<String> {
    wire.payload
        .iter()
        .find_map(|p| present(p.content_string.as_deref()))
}

fn payload_attachment_title(wire: &CommunicationWire) -> Option<String> {
    wire.payload.iter().find_map(|p| {
        p.content_attachment
            .as_ref()
            .and_then(|a| present(a.title.as_deref()))
    })
}

fn first_note(wire: &CommunicationWire) -> Option<String> {
    present(wire.note.first()?.text.as_deref())
}

const CATEGORY_CHAIN: &[Extractor<CommunicationWire>] = &[first_category];
const BODY_CHAIN: &[Extractor<CommunicationWire>] =
    &[payload_string, payload_attachment_title, first_note];

fn wire_to_domain(wire: &CommunicationWire) -> MessageData {
    MessageData {
        id: present(wire.id.as_deref()),
        status: wire
            .status
            .clone()
            .unwrap_or_else(|| MessageStatus::from_code(MISSING_STATUS)),
        priority: wire.priority.clone(),
        category: first_present(wire, CATEGORY_CHAIN).unwrap_or_else(|| UNKNOWN.to_string()),
        subject: target_label(wire.subject.as_ref()),
        topic: optional_concept_label(wire.topic.as_ref()),
        sender: party_label(wire.sender.as_ref()),
        recipients: wire
            .recipient
            .iter()
            .filter_map(|r| party_label(Some(r)))
            .collect(),
        sent: present(wire.sent.as_deref()),
        received: present(wire.received.as_deref()),
        body: first_present(wire, BODY_CHAIN).unwrap_or_default(),
        meta: RecordMeta::from_wire(wire.meta.as_ref()),
    }
}

fn domain_to_wire(data: &MessageData) -> CommunicationWire {
    CommunicationWire {
        resource_type: Some("Communication".to_string()),
        id: data.id.clone(),
        meta: data.meta.to_wire(),
        status: Some(data.status.clone()),
        priority: data.priority.clone(),
        category: unless_sentinel(&data.category, UNKNOWN)
            .map(CodeableConcept::from_text)
            .into_iter()
            .collect(),
        subject: data.subject.clone().map(|r| Reference {
            reference: Some(r),
            display: None,
        }),
        topic: data.topic.clone().map(CodeableConcept::from_text),
        sender: data.sender.clone().map(|d| Reference {
            reference: None,
            display: Some(d),
        }),
        recipient: data
            .recipients
            .iter()
            .map(|d| Reference {
                reference: None,
                display: Some(d.clone()),
            })
            .collect(),
        sent: data.sent.clone(),
        received: data.received.clone(),
        payload: unless_sentinel(&data.body, "")
            .map(|body| Payload {
                content_string: Some(body),
                content_attachment: None,
            })
            .into_iter()
            .collect(),
        note: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handover_message() -> Value {
        json!({
            "resourceType": "Communication",
            "id": "msg-11",
            "status": "completed",
            "priority": "routine",
            "category": [{"coding": [{"display": "Handover"}]}],
            "subject": {"reference": "Patient/p-1"},
            "topic": {"text": "Night shift handover"},
            "sender": {"display": "Nurse Patel"},
            "recipient": [{"display": "Dr Yusuf"}, {"reference": "PractitionerRole/ward-4"}],
            "sent": "2024-07-09T21:15:00Z",
            "payload": [
                {"contentAttachment": {"title": "handover.pdf"}},
                {"contentString": "Bed 4 febrile overnight, cultures sent."}
            ],
            "note": [{"text": "Follow up in morning"}]
        })
    }

    #[test]
    fn parses_message() {
        let msg = Communication::parse(&handover_message()).expect("parse message");
        assert_eq!(msg.status, MessageStatus::Completed);
        assert_eq!(msg.category, "Handover");
        assert_eq!(msg.topic.as_deref(), Some("Night shift handover"));
        assert_eq!(msg.recipients, vec!["Dr Yusuf", "PractitionerRole/ward-4"]);
        assert_eq!(msg.body, "Bed 4 febrile overnight, cultures sent.");
    }

    #[test]
    fn body_chain_falls_back_in_order() {
        let mut value = handover_message();
        value["payload"][1]["contentString"] = Value::Null;
        assert_eq!(Communication::parse(&value).expect("parse").body, "handover.pdf");

        value["payload"] = json!([]);
        assert_eq!(
            Communication::parse(&value).expect("parse").body,
            "Follow up in morning"
        );

        value["note"] = json!([]);
        assert_eq!(Communication::parse(&value).expect("parse").body, "");
    }

    #[test]
    fn round_trip_is_semantically_lossless() {
        let msg = Communication::parse(&handover_message()).expect("parse");
        let reparsed =
            Communication::parse(&Communication::render(&msg).expect("render")).expect("reparse");
        assert_eq!(msg, reparsed);
    }
}
