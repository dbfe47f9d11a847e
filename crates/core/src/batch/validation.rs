use super::{BatchOperation, OperationType};
use crate::catalog::KindProfile;
use crate::config::SyncConfig;
use crate::constants::STATUS_FIELD;
use crate::ValidationError;

/// Gate a batch before any collaborator is called.
///
/// Checks run in a fixed order and the first failure is returned:
/// 1. the selection is non-empty and within `max_batch_size`
/// 2. `delete` carries no edits, `update` carries at least one
/// 3. every edit targets a catalogued field, never `status` for activate/deactivate
/// 4. every edit value passes its field validator
///
/// # Errors
///
/// Returns the first [`ValidationError`] found.
pub fn validate(
    operation: &BatchOperation,
    profile: &KindProfile,
    config: &SyncConfig,
) -> Result<(), ValidationError> {
    let count = operation.target_ids().len();
    if count == 0 {
        return Err(ValidationError::EmptySelection);
    }
    if count > config.max_batch_size() {
        return Err(ValidationError::TooLarge {
            count,
            max: config.max_batch_size(),
        });
    }

    let op = operation.operation();
    let edits = operation.edits();
    match op {
        OperationType::Delete if !edits.is_empty() => return Err(ValidationError::EditsOnDelete),
        OperationType::Update if edits.is_empty() => return Err(ValidationError::MissingEdits),
        _ => {}
    }

    for edit in edits {
        if op.sets_status() && edit.path == STATUS_FIELD {
            return Err(ValidationError::StatusEditNotAllowed(op));
        }
        let field = profile
            .field(&edit.path)
            .ok_or_else(|| ValidationError::UnknownField {
                kind: operation.kind(),
                field: edit.path.clone(),
            })?;
        if !field.validate(&edit.value) {
            return Err(ValidationError::OutOfDomain {
                field: edit.path.clone(),
                value: edit.value.to_string(),
                expected: field.domain.describe(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::OperationCatalog;
    use crate::diff::FieldEdit;
    use clinsync_types::ResourceKind;
    use std::time::Duration;

    fn check(op: OperationType, targets: &[&str], edits: Vec<FieldEdit>) -> Result<(), ValidationError> {
        let catalog = OperationCatalog::standard();
        let profile = catalog.profile(ResourceKind::Order).expect("profile");
        let config = SyncConfig::new(2, Duration::ZERO, 5, "urn:test".into()).expect("config");
        validate(
            &BatchOperation::new(op, ResourceKind::Order, targets.iter().copied(), edits),
            profile,
            &config,
        )
    }

    #[test]
    fn empty_and_oversized_selections_are_rejected() {
        assert_eq!(
            check(OperationType::Archive, &[], Vec::new()),
            Err(ValidationError::EmptySelection)
        );
        assert_eq!(
            check(OperationType::Archive, &["a", "b", "c"], Vec::new()),
            Err(ValidationError::TooLarge { count: 3, max: 2 })
        );
    }

    #[test]
    fn update_needs_edits_and_delete_refuses_them() {
        assert_eq!(
            check(OperationType::Update, &["a"], Vec::new()),
            Err(ValidationError::MissingEdits)
        );
        assert_eq!(
            check(OperationType::Delete, &["a"], vec![FieldEdit::new("priority", "stat")]),
            Err(ValidationError::EditsOnDelete)
        );
        assert_eq!(check(OperationType::Delete, &["a"], Vec::new()), Ok(()));
    }

    #[test]
    fn edits_must_be_catalogued_and_in_domain() {
        assert!(matches!(
            check(OperationType::Update, &["a"], vec![FieldEdit::new("dosage", "x")]),
            Err(ValidationError::UnknownField { .. })
        ));
        assert!(matches!(
            check(OperationType::Update, &["a"], vec![FieldEdit::new("status", "paused")]),
            Err(ValidationError::OutOfDomain { .. })
        ));
        assert_eq!(
            check(
                OperationType::Update,
                &["a", "b"],
                vec![
                    FieldEdit::new("status", "on-hold"),
                    FieldEdit::new("medication.text", "Amoxicillin 250mg")
                ]
            ),
            Ok(())
        );
    }

    #[test]
    fn status_edits_are_invalid_for_activate_and_deactivate() {
        assert_eq!(
            check(OperationType::Activate, &["a"], vec![FieldEdit::new("status", "active")]),
            Err(ValidationError::StatusEditNotAllowed(OperationType::Activate))
        );
        assert_eq!(
            check(OperationType::Deactivate, &["a"], vec![FieldEdit::new("priority", "routine")]),
            Ok(())
        );
    }

    #[test]
    fn archive_accepts_optional_edits() {
        assert_eq!(check(OperationType::Archive, &["a"], Vec::new()), Ok(()));
        assert_eq!(
            check(OperationType::Archive, &["a"], vec![FieldEdit::new("status", "completed")]),
            Ok(())
        );
    }
}
