//! Actor identity.
//!
//! The authenticated user running a batch. The core reads it only to stamp history entries.

use crate::SyncResult;
use clinsync_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The person or service on whose behalf a batch runs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Display name of the actor.
    pub name: NonEmptyText,

    /// Upstream user id, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NonEmptyText>,
}

impl Actor {
    /// Create an actor from a display name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SyncError::Types`] if `name` is blank.
    pub fn new(name: impl AsRef<str>) -> SyncResult<Self> {
        Ok(Self {
            name: NonEmptyText::new(name)?,
            id: None,
        })
    }

    /// Attach an upstream user id.
    pub fn with_id(mut self, id: impl AsRef<str>) -> SyncResult<Self> {
        self.id = Some(NonEmptyText::new(id)?);
        Ok(self)
    }

    /// Label recorded in history entries: `name` or `name (id)`.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{} ({})", self.name, id),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncError;

    #[test]
    fn label_includes_id_when_present() {
        let actor = Actor::new("Dr Amina Yusuf").expect("actor");
        assert_eq!(actor.label(), "Dr Amina Yusuf");
        let actor = actor.with_id("prac-17").expect("id");
        assert_eq!(actor.label(), "Dr Amina Yusuf (prac-17)");
    }

    #[test]
    fn blank_name_is_rejected() {
        assert!(matches!(Actor::new("   "), Err(SyncError::Types(_))));
    }
}
