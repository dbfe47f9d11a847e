//! Shared validated primitives for clinsync.
//!
//! This crate holds the small value types that every other crate agrees on:
//! - [`NonEmptyText`] for names and labels that must carry content
//! - [`ResourceKind`] for the four clinical resource kinds the batch layer understands

use std::fmt;
use std::str::FromStr;

/// Errors that can occur when creating validated types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    /// The resource kind name is not one of order, task, document or message
    #[error("unknown resource kind: {0}")]
    UnknownResourceKind(String),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::Empty`] if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypesError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TypesError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// The kind of an upstream clinical resource.
///
/// A resource is identified by `(kind, id)`. Each kind is backed by one or more FHIR resource
/// types on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Medication and service orders.
    Order,
    /// Workflow tasks.
    Task,
    /// Clinical documents and notes.
    Document,
    /// Communications between care team members.
    Message,
}

impl ResourceKind {
    /// All resource kinds, in display order.
    pub const ALL: [ResourceKind; 4] = [Self::Order, Self::Task, Self::Document, Self::Message];

    /// Returns the lowercase name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Task => "task",
            Self::Document => "document",
            Self::Message => "message",
        }
    }

    /// FHIR resource types that carry this kind on the wire.
    ///
    /// The first entry is the primary type used when addressing the upstream API.
    pub fn resource_types(&self) -> &'static [&'static str] {
        match self {
            Self::Order => &["MedicationRequest", "ServiceRequest"],
            Self::Task => &["Task"],
            Self::Document => &["DocumentReference"],
            Self::Message => &["Communication"],
        }
    }

    /// Returns the primary FHIR resource type for this kind.
    pub fn primary_resource_type(&self) -> &'static str {
        self.resource_types()[0]
    }

    /// Maps a FHIR `resourceType` back to its kind.
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.resource_types().contains(&resource_type))
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = TypesError;

    /// Parses a kind name (case-insensitive); plural forms are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let singular = lowered.strip_suffix('s').unwrap_or(&lowered);
        match singular {
            "order" => Ok(Self::Order),
            "task" => Ok(Self::Task),
            "document" => Ok(Self::Document),
            "message" => Ok(Self::Message),
            _ => Err(TypesError::UnknownResourceKind(s.to_string())),
        }
    }
}
