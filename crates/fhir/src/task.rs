//! FHIR-aligned task wire models and translation helpers.
//!
//! Tasks drive the clinical work queue. The task description shown to users falls back from
//! the authored `description` to the task `code`.

use crate::datatypes::{
    Annotation, CodeableConcept, Meta, Period, Priority, RecordMeta, Reference, TaskStatus,
    MISSING_STATUS,
};
use crate::fallback::{
    first_present, optional_concept_label, party_label, present, target_label, unless_sentinel,
    Extractor, UNKNOWN,
};
use crate::{check_resource_type, parse_wire, render_wire, FhirResult};
use clinsync_types::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Public domain-level types
// ============================================================================

/// Domain-level carrier for a task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskData {
    /// Upstream resource id.
    pub id: Option<String>,

    /// Business status.
    pub status: TaskStatus,

    /// Task intent.
    pub intent: Option<String>,

    /// Task priority.
    pub priority: Option<Priority>,

    /// What the task asks for, or [`UNKNOWN`].
    pub description: String,

    /// Coded task type label.
    pub code: Option<String>,

    /// The record this task acts on.
    pub focus: Option<String>,

    /// Patient the task is for.
    pub subject: Option<String>,

    /// Who asked for the task.
    pub requester: Option<String>,

    /// Who is responsible for the task.
    pub owner: Option<String>,

    /// When the task was created.
    pub authored_on: Option<String>,

    /// When the task was last modified.
    pub last_modified: Option<String>,

    /// Due date (`restriction.period.end`).
    pub due_date: Option<String>,

    /// Free-text notes.
    pub notes: Vec<String>,

    /// Version and tags.
    pub meta: RecordMeta,
}

// ============================================================================
// Public Task operations
// ============================================================================

/// Task resource operations.
pub struct Task;

impl Task {
    /// Parse a task from its wire JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if `resourceType` is not `Task` or an element has an
    /// unexpected JSON type.
    pub fn parse(json: &Value) -> FhirResult<TaskData> {
        let wire: TaskWire = parse_wire(json, "Task")?;
        check_resource_type(wire.resource_type.as_deref(), ResourceKind::Task)?;
        Ok(wire_to_domain(&wire))
    }

    /// Render a task as wire JSON.
    pub fn render(data: &TaskData) -> FhirResult<Value> {
        render_wire(&domain_to_wire(data), "task")
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskRestriction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    period: Option<Period>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    focus: Option<Reference>,
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    for_subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requester: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    owner: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authored_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    restriction: Option<TaskRestriction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    note: Vec<Annotation>,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn authored_description(wire: &TaskWire) -> Option<String> {
    present(wire.description.as_deref())
}

fn code_text(wire: &TaskWire) -> Option<String> {
    present(wire.code.as_ref()?.text.as_deref())
}

fn code_display(wire: &TaskWire) -> Option<String> {
    present(wire.code.as_ref()?.coding.first()?.display.as_deref())
}

const DESCRIPTION_CHAIN: &[Extractor<TaskWire>] = &[authored_description, code_text, code_display];

fn wire_to_domain(wire: &TaskWire) -> TaskData {
    TaskData {
        id: present(wire.id.as_deref()),
        status: wire
            .status
            .clone()
            .unwrap_or_else(|| TaskStatus::from_code(MISSING_STATUS)),
        intent: present(wire.intent.as_deref()),
        priority: wire.priority.clone(),
        description: first_present(wire, DESCRIPTION_CHAIN).unwrap_or_else(|| UNKNOWN.to_string()),
        code: optional_concept_label(wire.code.as_ref()),
        focus: target_label(wire.focus.as_ref()),
        subject: target_label(wire.for_subject.as_ref()),
        requester: party_label(wire.requester.as_ref()),
        owner: party_label(wire.owner.as_ref()),
        authored_on: present(wire.authored_on.as_deref()),
        last_modified: present(wire.last_modified.as_deref()),
        due_date: wire
            .restriction
            .as_ref()
            .and_then(|r| r.period.as_ref())
            .and_then(|p| present(p.end.as_deref())),
        notes: wire
            .note
            .iter()
            .filter_map(|n| present(n.text.as_deref()))
            .collect(),
        meta: RecordMeta::from_wire(wire.meta.as_ref()),
    }
}

fn pointer(reference: &Option<String>) -> Option<Reference> {
    reference.clone().map(|r| Reference {
        reference: Some(r),
        display: None,
    })
}

fn party(display: &Option<String>) -> Option<Reference> {
    display.clone().map(|d| Reference {
        reference: None,
        display: Some(d),
    })
}

fn domain_to_wire(data: &TaskData) -> TaskWire {
    TaskWire {
        resource_type: Some("Task".to_string()),
        id: data.id.clone(),
        meta: data.meta.to_wire(),
        status: Some(data.status.clone()),
        intent: data.intent.clone(),
        priority: data.priority.clone(),
        code: data.code.clone().map(CodeableConcept::from_text),
        description: unless_sentinel(&data.description, UNKNOWN),
        focus: pointer(&data.focus),
        for_subject: pointer(&data.subject),
        requester: party(&data.requester),
        owner: party(&data.owner),
        authored_on: data.authored_on.clone(),
        last_modified: data.last_modified.clone(),
        restriction: data.due_date.clone().map(|end| TaskRestriction {
            period: Some(Period {
                start: None,
                end: Some(end),
            }),
        }),
        note: data
            .notes
            .iter()
            .map(|text| Annotation {
                text: Some(text.clone()),
                time: None,
            })
            .collect(),
    }
}
