use crate::diff::FieldEdit;
use crate::selection::SelectionSet;
use crate::{SyncError, SyncResult};
use clinsync_types::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The mutation a batch applies to every target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Update,
    Delete,
    Archive,
    Activate,
    Deactivate,
}

impl OperationType {
    pub const ALL: [OperationType; 5] = [
        Self::Update,
        Self::Delete,
        Self::Archive,
        Self::Activate,
        Self::Deactivate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Archive => "archive",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        }
    }

    /// Whether this operation sets the status itself.
    pub fn sets_status(&self) -> bool {
        matches!(self, Self::Activate | Self::Deactivate)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == wanted)
            .ok_or_else(|| SyncError::InvalidInput(format!("unknown operation: {s}")))
    }
}

/// An immutable, user-confirmed request to mutate many resources identically.
///
/// Target ids are de-duplicated on construction, keeping first occurrences in order, so that
/// every target yields exactly one outcome.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchOperation {
    id: Uuid,
    operation: OperationType,
    kind: ResourceKind,
    target_ids: Vec<String>,
    edits: Vec<FieldEdit>,
}

impl BatchOperation {
    pub fn new<I, S>(
        operation: OperationType,
        kind: ResourceKind,
        target_ids: I,
        edits: Vec<FieldEdit>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for id in target_ids {
            let id: String = id.into();
            if seen.insert(id.clone()) {
                unique.push(id);
            }
        }
        Self {
            id: Uuid::new_v4(),
            operation,
            kind,
            target_ids: unique,
            edits,
        }
    }

    /// Capture the current selection as a batch operation.
    pub fn from_selection(
        operation: OperationType,
        selection: &SelectionSet,
        edits: Vec<FieldEdit>,
    ) -> Self {
        Self::new(operation, selection.kind(), selection.targets(), edits)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn operation(&self) -> OperationType {
        self.operation
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn target_ids(&self) -> &[String] {
        &self.target_ids
    }

    pub fn edits(&self) -> &[FieldEdit] {
        &self.edits
    }
}
