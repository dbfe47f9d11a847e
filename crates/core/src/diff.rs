//! Diff Builder.
//!
//! Turns a list of [`FieldEdit`]s into the concrete mutation payload for one resource. Paths are
//! dotted; missing intermediate containers are created as empty objects, left to right. Edits
//! apply in the order given and a later edit to the same path replaces an earlier one.
//!
//! Operation-specific shaping happens after the explicit edits:
//! - `archive` appends the audit tag to `meta.tag`, keeping existing tags
//! - `activate` / `deactivate` write the kind's fixed status
//! - `delete` produces no payload at all

use crate::batch::OperationType;
use crate::catalog::KindProfile;
use crate::config::SyncConfig;
use crate::constants::{ARCHIVE_TAG_CODE, ARCHIVE_TAG_DISPLAY, PATH_SEPARATOR, STATUS_FIELD};
use crate::DiffError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One `(path, value)` change requested by the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldEdit {
    pub path: String,
    pub value: Value,
}

impl FieldEdit {
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

fn segments(path: &str) -> Result<Vec<&str>, DiffError> {
    let parts: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(DiffError::EmptyPath(path.to_string()));
    }
    Ok(parts)
}

/// Set `path` on `target`, creating missing intermediate objects.
///
/// # Errors
///
/// Returns [`DiffError::NotAnObject`] if `target` is not an object,
/// [`DiffError::EmptyPath`] for a malformed path, and [`DiffError::PathConflict`] if an
/// intermediate segment already holds a non-object value.
pub fn set_path(target: &mut Value, path: &str, value: Value) -> Result<(), DiffError> {
    let parts = segments(path)?;
    let Some((leaf, parents)) = parts.split_last() else {
        return Err(DiffError::EmptyPath(path.to_string()));
    };

    let mut cursor = target.as_object_mut().ok_or(DiffError::NotAnObject)?;
    for segment in parents {
        let next = cursor
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        cursor = next.as_object_mut().ok_or_else(|| DiffError::PathConflict {
            path: path.to_string(),
            segment: segment.to_string(),
        })?;
    }
    cursor.insert(leaf.to_string(), value);
    Ok(())
}

/// Apply `edits` in order to a structural copy of `resource`.
pub fn apply_edits(resource: &Value, edits: &[FieldEdit]) -> Result<Value, DiffError> {
    if !resource.is_object() {
        return Err(DiffError::NotAnObject);
    }
    let mut payload = resource.clone();
    for edit in edits {
        set_path(&mut payload, &edit.path, edit.value.clone())?;
    }
    Ok(payload)
}

/// Append a `{system, code, display}` coding to `meta.tag` unless an equal system/code pair is
/// already there.
pub fn append_tag(
    resource: &mut Value,
    system: &str,
    code: &str,
    display: &str,
) -> Result<(), DiffError> {
    let root = resource.as_object_mut().ok_or(DiffError::NotAnObject)?;
    let meta = root
        .entry("meta")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| DiffError::PathConflict {
            path: "meta.tag".to_string(),
            segment: "meta".to_string(),
        })?;
    let tags = meta
        .entry("tag")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| DiffError::PathConflict {
            path: "meta.tag".to_string(),
            segment: "tag".to_string(),
        })?;

    let already_tagged = tags.iter().any(|t| {
        t.get("system").and_then(Value::as_str) == Some(system)
            && t.get("code").and_then(Value::as_str) == Some(code)
    });
    if !already_tagged {
        tags.push(json!({"system": system, "code": code, "display": display}));
    }
    Ok(())
}

/// Builds per-resource payloads for a batch operation.
#[derive(Clone, Debug)]
pub struct DiffBuilder {
    archive_tag_system: String,
}

impl DiffBuilder {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            archive_tag_system: config.archive_tag_system().to_string(),
        }
    }

    /// Build the payload `operation` sends for `resource`.
    ///
    /// Returns `Ok(None)` for `delete`, which sends no payload.
    ///
    /// # Errors
    ///
    /// Returns [`DiffError`] if the resource or an edit path cannot be shaped.
    pub fn build_payload(
        &self,
        operation: OperationType,
        profile: &KindProfile,
        resource: &Value,
        edits: &[FieldEdit],
    ) -> Result<Option<Value>, DiffError> {
        if operation == OperationType::Delete {
            return Ok(None);
        }

        let resource_type = resource.get("resourceType").and_then(Value::as_str);
        for edit in edits {
            if let Some(field) = profile.field(&edit.path) {
                if !field.applies_to(resource_type) {
                    return Err(DiffError::NotApplicable {
                        path: edit.path.clone(),
                        resource_type: resource_type.unwrap_or("untyped").to_string(),
                    });
                }
            }
        }

        let mut payload = apply_edits(resource, edits)?;
        match operation {
            OperationType::Archive => append_tag(
                &mut payload,
                &self.archive_tag_system,
                ARCHIVE_TAG_CODE,
                ARCHIVE_TAG_DISPLAY,
            )?,
            OperationType::Activate | OperationType::Deactivate => {
                if let Some(status) = profile.status_for(operation) {
                    set_path(&mut payload, STATUS_FIELD, Value::from(status))?;
                }
            }
            OperationType::Update | OperationType::Delete => {}
        }
        Ok(Some(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::OperationCatalog;
    use clinsync_types::ResourceKind;

    fn order() -> Value {
        json!({
            "resourceType": "MedicationRequest",
            "id": "o-1",
            "status": "active",
            "meta": {"versionId": "4", "tag": [{"system": "urn:ward", "code": "w4"}]},
            "medication": {"text": "Amoxicillin"}
        })
    }

    fn builder() -> DiffBuilder {
        DiffBuilder::new(&SyncConfig::default())
    }

    #[test]
    fn nested_path_creates_intermediate_containers() {
        let payload = apply_edits(&json!({"id": "t"}), &[FieldEdit::new("a.b.c", 5)])
            .expect("apply");
        assert_eq!(payload, json!({"id": "t", "a": {"b": {"c": 5}}}));
    }

    #[test]
    fn existing_containers_are_kept() {
        let payload = apply_edits(&order(), &[FieldEdit::new("medication.text", "Co-amoxiclav")])
            .expect("apply");
        assert_eq!(payload["medication"], json!({"text": "Co-amoxiclav"}));
        assert_eq!(payload["meta"], order()["meta"]);
    }

    #[test]
    fn applying_an_edit_twice_is_idempotent() {
        let edit = FieldEdit::new("priority", "urgent");
        let once = apply_edits(&order(), &[edit.clone()]).expect("once");
        let twice = apply_edits(&once, &[edit]).expect("twice");
        assert_eq!(once, twice);
    }

    #[test]
    fn later_edits_win() {
        let payload = apply_edits(
            &order(),
            &[
                FieldEdit::new("status", "on-hold"),
                FieldEdit::new("status", "revoked"),
            ],
        )
        .expect("apply");
        assert_eq!(payload["status"], "revoked");
    }

    #[test]
    fn non_object_intermediate_is_a_conflict() {
        let err = apply_edits(&order(), &[FieldEdit::new("status.code", "x")])
            .expect_err("conflict");
        assert_eq!(
            err,
            DiffError::PathConflict {
                path: "status.code".into(),
                segment: "status".into()
            }
        );
    }

    #[test]
    fn malformed_paths_and_payloads_are_rejected() {
        assert!(matches!(
            apply_edits(&order(), &[FieldEdit::new("a..b", 1)]),
            Err(DiffError::EmptyPath(_))
        ));
        assert!(matches!(
            apply_edits(&order(), &[FieldEdit::new("", 1)]),
            Err(DiffError::EmptyPath(_))
        ));
        assert_eq!(apply_edits(&json!([1]), &[]), Err(DiffError::NotAnObject));
    }

    #[test]
    fn archive_appends_one_tag_and_keeps_existing() {
        let catalog = OperationCatalog::standard();
        let profile = catalog.profile(ResourceKind::Order).expect("profile");
        let payload = builder()
            .build_payload(OperationType::Archive, profile, &order(), &[])
            .expect("build")
            .expect("payload");
        let tags = payload["meta"]["tag"].as_array().expect("tags");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0]["code"], "w4");
        assert_eq!(tags[1]["system"], "urn:clinsync:audit");
        assert_eq!(tags[1]["code"], "archived");

        let again = builder()
            .build_payload(OperationType::Archive, profile, &payload, &[])
            .expect("build")
            .expect("payload");
        assert_eq!(again, payload);
    }

    #[test]
    fn archive_creates_meta_when_missing() {
        let catalog = OperationCatalog::standard();
        let profile = catalog.profile(ResourceKind::Task).expect("profile");
        let payload = builder()
            .build_payload(
                OperationType::Archive,
                profile,
                &json!({"resourceType": "Task", "id": "t-1"}),
                &[],
            )
            .expect("build")
            .expect("payload");
        assert_eq!(payload["meta"]["tag"][0]["code"], "archived");
    }

    #[test]
    fn activate_and_deactivate_write_fixed_status() {
        let catalog = OperationCatalog::standard();
        let profile = catalog.profile(ResourceKind::Task).expect("profile");
        let resource = json!({"resourceType": "Task", "status": "requested"});
        let activated = builder()
            .build_payload(OperationType::Activate, profile, &resource, &[])
            .expect("build")
            .expect("payload");
        assert_eq!(activated["status"], "in-progress");
        let deactivated = builder()
            .build_payload(
                OperationType::Deactivate,
                profile,
                &resource,
                &[FieldEdit::new("priority", "urgent")],
            )
            .expect("build")
            .expect("payload");
        assert_eq!(deactivated["status"], "on-hold");
        assert_eq!(deactivated["priority"], "urgent");
    }

    #[test]
    fn medication_edit_is_refused_on_service_orders() {
        let catalog = OperationCatalog::standard();
        let profile = catalog.profile(ResourceKind::Order).expect("profile");
        let edits = [FieldEdit::new("medication.text", "Co-amoxiclav")];
        let service = json!({"resourceType": "ServiceRequest", "id": "sr-1", "status": "active"});

        assert_eq!(
            builder().build_payload(OperationType::Update, profile, &service, &edits),
            Err(DiffError::NotApplicable {
                path: "medication.text".into(),
                resource_type: "ServiceRequest".into()
            })
        );

        let payload = builder()
            .build_payload(OperationType::Update, profile, &order(), &edits)
            .expect("build")
            .expect("payload");
        assert_eq!(payload["medication"]["text"], "Co-amoxiclav");
    }

    #[test]
    fn delete_has_no_payload() {
        let catalog = OperationCatalog::standard();
        let profile = catalog.profile(ResourceKind::Order).expect("profile");
        assert_eq!(
            builder()
                .build_payload(OperationType::Delete, profile, &order(), &[])
                .expect("build"),
            None
        );
    }
}
