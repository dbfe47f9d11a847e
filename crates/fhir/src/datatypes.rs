//! FHIR datatypes shared by every resource wire model.
//!
//! Wire structs in this module are deliberately lenient: unknown keys are ignored and every
//! element is optional, because upstream records vary in which optional fields are present.
//! Type mismatches (for example a number where a string is expected) still fail to parse.
//!
//! The module also defines the coded enumerations (statuses, priority) used by the domain
//! carriers. Unrecognised codes are kept verbatim in an `Other` variant so that a record read
//! from the wire can be written back without losing its status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Coded enumerations
// ============================================================================

macro_rules! code_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $code:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A code outside the known value set, kept verbatim.
            Other(String),
        }

        impl $name {
            /// Every known code, in declaration order.
            pub const CODES: &'static [&'static str] = &[$($code),+];

            /// Parses a wire code. Unknown codes become [`Self::Other`].
            pub fn from_code(code: &str) -> Self {
                match code {
                    $( $code => Self::$variant, )+
                    other => Self::Other(other.to_string()),
                }
            }

            /// Returns the wire code for this value.
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $code, )+
                    Self::Other(code) => code.as_str(),
                }
            }

            /// Whether this value is one of the known codes.
            pub fn is_known(&self) -> bool {
                !matches!(self, Self::Other(_))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let code = String::deserialize(deserializer)?;
                Ok(Self::from_code(&code))
            }
        }
    };
}

/// Code stored when a record arrives without any status.
pub const MISSING_STATUS: &str = "unknown";

code_enum! {
    /// Order status (MedicationRequest / ServiceRequest).
    OrderStatus {
        Draft => "draft",
        Active => "active",
        OnHold => "on-hold",
        Revoked => "revoked",
        Completed => "completed",
        EnteredInError => "entered-in-error",
    }
}

code_enum! {
    /// Task business status.
    TaskStatus {
        Draft => "draft",
        Requested => "requested",
        Received => "received",
        Accepted => "accepted",
        Rejected => "rejected",
        Ready => "ready",
        Cancelled => "cancelled",
        InProgress => "in-progress",
        OnHold => "on-hold",
        Failed => "failed",
        Completed => "completed",
        EnteredInError => "entered-in-error",
    }
}

code_enum! {
    /// DocumentReference status.
    DocumentStatus {
        Current => "current",
        Superseded => "superseded",
        EnteredInError => "entered-in-error",
    }
}

code_enum! {
    /// Communication status.
    MessageStatus {
        Preparation => "preparation",
        InProgress => "in-progress",
        NotDone => "not-done",
        OnHold => "on-hold",
        Stopped => "stopped",
        Completed => "completed",
        EnteredInError => "entered-in-error",
        Unknown => "unknown",
    }
}

code_enum! {
    /// Request priority shared by orders, tasks and messages.
    Priority {
        Routine => "routine",
        Urgent => "urgent",
        Asap => "asap",
        Stat => "stat",
    }
}

// ============================================================================
// Wire datatypes
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CodeableConcept {
    /// A concept carrying only free text.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            coding: Vec::new(),
            text: Some(text.into()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quantity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<Quantity>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag: Vec<Coding>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingRepeat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_unit: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<TimingRepeat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseAndRate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dose_quantity: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dose_range: Option<Range>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dosage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dose_and_rate: Vec<DoseAndRate>,
}

// ============================================================================
// Domain-level metadata
// ============================================================================

/// A tag attached to a record's metadata (for example an audit marker).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tag {
    pub system: Option<String>,
    pub code: Option<String>,
    pub display: Option<String>,
}

/// Version and tagging information common to every domain object.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordMeta {
    /// Upstream version marker.
    pub version_id: Option<String>,

    /// Last-modified marker.
    pub last_updated: Option<DateTime<Utc>>,

    /// Tags in wire order.
    pub tags: Vec<Tag>,
}

impl RecordMeta {
    pub(crate) fn from_wire(meta: Option<&Meta>) -> Self {
        let Some(meta) = meta else {
            return Self::default();
        };
        Self {
            version_id: meta.version_id.clone(),
            last_updated: meta.last_updated,
            tags: meta
                .tag
                .iter()
                .map(|c| Tag {
                    system: c.system.clone(),
                    code: c.code.clone(),
                    display: c.display.clone(),
                })
                .collect(),
        }
    }

    pub(crate) fn to_wire(&self) -> Option<Meta> {
        if self == &Self::default() {
            return None;
        }
        Some(Meta {
            version_id: self.version_id.clone(),
            last_updated: self.last_updated,
            tag: self
                .tags
                .iter()
                .map(|t| Coding {
                    system: t.system.clone(),
                    code: t.code.clone(),
                    display: t.display.clone(),
                })
                .collect(),
        })
    }

    /// Whether a tag with the given system and code is present.
    pub fn has_tag(&self, system: &str, code: &str) -> bool {
        self.tags
            .iter()
            .any(|t| t.system.as_deref() == Some(system) && t.code.as_deref() == Some(code))
    }
}
