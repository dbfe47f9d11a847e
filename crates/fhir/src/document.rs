//! FHIR-aligned clinical document wire models and translation helpers.
//!
//! Documents are `DocumentReference` resources. The document type label falls back from the
//! `type` concept to the first `category` concept.

use crate::datatypes::{
    Attachment, CodeableConcept, DocumentStatus, Meta, RecordMeta, Reference, MISSING_STATUS,
};
use crate::fallback::{
    concept_label, first_present, party_label, present, target_label, unless_sentinel, Extractor,
    UNKNOWN,
};
use crate::{check_resource_type, parse_wire, render_wire, FhirResult};
use clinsync_types::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attachment details for the first document content entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttachmentData {
    pub content_type: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
}

/// Domain-level carrier for a clinical document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentData {
    pub id: Option<String>,
    pub status: DocumentStatus,

    /// Composition status (preliminary, final, amended, ...).
    pub doc_status: Option<String>,

    /// Document type label, or [`UNKNOWN`].
    pub document_type: String,

    pub description: Option<String>,
    pub date: Option<String>,
    pub subject: Option<String>,
    pub authors: Vec<String>,
    pub attachment: Option<AttachmentData>,
    pub meta: RecordMeta,
}

/// Document resource operations.
pub struct Document;

impl Document {
    /// Parse a document from its wire JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if `resourceType` is not `DocumentReference` or an element
    /// has an unexpected JSON type.
    pub fn parse(json: &Value) -> FhirResult<DocumentData> {
        let wire: DocumentWire = parse_wire(json, "Document")?;
        check_resource_type(wire.resource_type.as_deref(), ResourceKind::Document)?;
        Ok(wire_to_domain(&wire))
    }

    /// Render a document as wire JSON.
    pub fn render(data: &DocumentData) -> FhirResult<Value> {
        render_wire(&domain_to_wire(data), "document")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attachment: Option<Attachment>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<DocumentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    doc_status: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    doc_type: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    category: Vec<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    author: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    content: Vec<DocumentContent>,
}

fn type_label(wire: &DocumentWire) -> Option<String> {
    concept_label(wire.doc_type.as_ref()?)
}

fn category_label(wire: &DocumentWire) -> Option<String> {
    concept_label(wire.category.first()?)
}

const DOCUMENT_TYPE_CHAIN: &[Extractor<DocumentWire>] = &[type_label, category_label];

fn wire_to_domain(wire: &DocumentWire) -> DocumentData {
    let attachment = wire
        .content
        .first()
        .and_then(|c| c.attachment.as_ref())
        .map(|a| AttachmentData {
            content_type: present(a.content_type.as_deref()),
            url: present(a.url.as_deref()),
            title: present(a.title.as_deref()),
        })
        .filter(|a| a != &AttachmentData::default());

    DocumentData {
        id: present(wire.id.as_deref()),
        status: wire
            .status
            .clone()
            .unwrap_or_else(|| DocumentStatus::from_code(MISSING_STATUS)),
        doc_status: present(wire.doc_status.as_deref()),
        document_type: first_present(wire, DOCUMENT_TYPE_CHAIN)
            .unwrap_or_else(|| UNKNOWN.to_string()),
        description: present(wire.description.as_deref()),
        date: present(wire.date.as_deref()),
        subject: target_label(wire.subject.as_ref()),
        authors: wire
            .author
            .iter()
            .filter_map(|a| party_label(Some(a)))
            .collect(),
        attachment,
        meta: RecordMeta::from_wire(wire.meta.as_ref()),
    }
}

fn domain_to_wire(data: &DocumentData) -> DocumentWire {
    DocumentWire {
        resource_type: Some("DocumentReference".to_string()),
        id: data.id.clone(),
        meta: data.meta.to_wire(),
        status: Some(data.status.clone()),
        doc_status: data.doc_status.clone(),
        doc_type: unless_sentinel(&data.document_type, UNKNOWN).map(CodeableConcept::from_text),
        category: Vec::new(),
        subject: data.subject.clone().map(|r| Reference {
            reference: Some(r),
            display: None,
        }),
        date: data.date.clone(),
        author: data
            .authors
            .iter()
            .map(|a| Reference {
                reference: None,
                display: Some(a.clone()),
            })
            .collect(),
        description: data.description.clone(),
        content: data
            .attachment
            .iter()
            .map(|a| DocumentContent {
                attachment: Some(Attachment {
                    content_type: a.content_type.clone(),
                    url: a.url.clone(),
                    title: a.title.clone(),
                }),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn discharge_summary() -> Value {
        json!({
            "resourceType": "DocumentReference",
            "id": "doc-3",
            "meta": {"tag": [{"system": "urn:ward", "code": "w4"}]},
            "status": "current",
            "docStatus": "final",
            "type": {"coding": [{"system": "http://loinc.org", "code": "18842-5", "display": "Discharge summary"}]},
            "category": [{"text": "Clinical note"}],
            "subject": {"reference": "Patient/p-1"},
            "date": "2024-06-01T12:00:00Z",
            "author": [{"display": "Dr Ngozi Adeyemi"}, {"reference": "Practitioner/22"}],
            "content": [{"attachment": {"contentType": "text/plain", "url": "Binary/b-1", "title": "Discharge"}}]
        })
    }

    #[test]
    fn parses_document() {
        let doc = Document::parse(&discharge_summary()).expect("parse document");
        assert_eq!(doc.status, DocumentStatus::Current);
        assert_eq!(doc.doc_status.as_deref(), Some("final"));
        assert_eq!(doc.document_type, "Discharge summary");
        assert_eq!(doc.authors, vec!["Dr Ngozi Adeyemi", "Practitioner/22"]);
        assert_eq!(
            doc.attachment.and_then(|a| a.content_type).as_deref(),
            Some("text/plain")
        );
        assert!(doc.meta.has_tag("urn:ward", "w4"));
    }

    #[test]
    fn document_type_falls_back_to_category() {
        let mut value = discharge_summary();
        value["type"] = Value::Null;
        assert_eq!(Document::parse(&value).expect("parse").document_type, "Clinical note");
        value["category"] = json!([]);
        assert_eq!(Document::parse(&value).expect("parse").document_type, UNKNOWN);
    }

    #[test]
    fn round_trip_is_semantically_lossless() {
        let doc = Document::parse(&discharge_summary()).expect("parse");
        let reparsed =
            Document::parse(&Document::render(&doc).expect("render")).expect("reparse");
        assert_eq!(doc, reparsed);
    }
}
