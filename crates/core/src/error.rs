use crate::batch::OperationType;
use clinsync_types::{ResourceKind, TypesError};
use fhir::FhirError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("batch rejected: {0}")]
    Validation(#[from] ValidationError),
    #[error("a batch operation is already validating or running")]
    Busy,
    #[error("no catalog profile registered for resource kind {0}")]
    UnknownResourceKind(ResourceKind),
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("FHIR error: {0}")]
    Fhir(#[from] FhirError),
    #[error(transparent)]
    Types(#[from] TypesError),

    #[error("failed to serialize JSON: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize JSON: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write file: {0}")]
    FileWrite(std::io::Error),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Reason a batch was rejected before any target was touched.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("selection is empty")]
    EmptySelection,
    #[error("selection of {count} exceeds the maximum batch size of {max}")]
    TooLarge { count: usize, max: usize },
    #[error("update requires at least one field edit")]
    MissingEdits,
    #[error("field `{field}` is not editable on {kind} resources")]
    UnknownField { kind: ResourceKind, field: String },
    #[error("value {value} is not valid for `{field}` (expected {expected})")]
    OutOfDomain {
        field: String,
        value: String,
        expected: String,
    },
    #[error("status cannot be edited by {0}; it is set by the operation")]
    StatusEditNotAllowed(OperationType),
    #[error("delete does not accept field edits")]
    EditsOnDelete,
}

/// Failure reported by a clinical-data API collaborator for one resource.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },
    #[error("{kind} {id} conflict: {message}")]
    Conflict {
        kind: ResourceKind,
        id: String,
        message: String,
    },
    #[error("server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure while shaping a mutation payload for one resource.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    #[error("resource payload must be a JSON object")]
    NotAnObject,
    #[error("field path `{0}` is empty or has an empty segment")]
    EmptyPath(String),
    #[error("cannot set `{path}`: `{segment}` exists and is not an object")]
    PathConflict { path: String, segment: String },
    #[error("field `{path}` does not exist on {resource_type} resources")]
    NotApplicable { path: String, resource_type: String },
}
