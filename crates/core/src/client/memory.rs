use super::ClinicalApi;
use crate::{ApiError, SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use clinsync_types::ResourceKind;
use fhir::Normalizer;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Key = (ResourceKind, String);

/// Number of collaborator calls made so far.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub reads: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl CallCounts {
    /// Calls that would have mutated the store.
    pub fn mutations(&self) -> usize {
        self.updates + self.deletes
    }
}

/// A [`ClinicalApi`] backed by an in-process map.
///
/// Updates bump `meta.versionId` and stamp `meta.lastUpdated` the way a FHIR server would.
/// Failures can be injected per target to exercise per-item isolation.
#[derive(Default)]
pub struct InMemoryClinicalApi {
    resources: Mutex<BTreeMap<Key, Value>>,
    failures: Mutex<HashMap<Key, ApiError>>,
    reads: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn next_version(meta: &Map<String, Value>) -> String {
    meta.get("versionId")
        .and_then(Value::as_str)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(1, |v| v + 1)
        .to_string()
}

impl InMemoryClinicalApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a JSON array of resources or a FHIR `Bundle`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidInput`] if an entry has no id or an unsupported
    /// `resourceType`, and [`SyncError::Fhir`] if an entry does not normalise (for example a
    /// `status` that is not a string).
    pub fn from_json(value: &Value) -> SyncResult<Self> {
        let entries: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(obj) if obj.get("resourceType").and_then(Value::as_str) == Some("Bundle") => obj
                .get("entry")
                .and_then(Value::as_array)
                .map(|entries| entries.iter().filter_map(|e| e.get("resource")).collect())
                .unwrap_or_default(),
            _ => {
                return Err(SyncError::InvalidInput(
                    "resource file must hold a JSON array or a Bundle".into(),
                ))
            }
        };

        let store = Self::new();
        for resource in entries {
            let resource_type = resource
                .get("resourceType")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let kind = ResourceKind::from_resource_type(resource_type).ok_or_else(|| {
                SyncError::InvalidInput(format!("unsupported resourceType {resource_type:?}"))
            })?;
            let id = resource
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| {
                    SyncError::InvalidInput(format!("{resource_type} resource has no id"))
                })?;
            Normalizer::to_domain(kind, resource)?;
            store.insert(kind, id, resource.clone());
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path).map_err(SyncError::FileRead)?;
        let value: Value = serde_json::from_str(&text).map_err(SyncError::Deserialization)?;
        Self::from_json(&value)
    }

    /// Write every resource back as a JSON array.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        let all: Vec<Value> = lock(&self.resources).values().cloned().collect();
        let text = serde_json::to_string_pretty(&all).map_err(SyncError::Serialization)?;
        std::fs::write(path, text).map_err(SyncError::FileWrite)
    }

    pub fn insert(&self, kind: ResourceKind, id: impl Into<String>, resource: Value) {
        lock(&self.resources).insert((kind, id.into()), resource);
    }

    pub fn get(&self, kind: ResourceKind, id: &str) -> Option<Value> {
        lock(&self.resources).get(&(kind, id.to_string())).cloned()
    }

    /// Resources of `kind`, ordered by id.
    pub fn snapshot(&self, kind: ResourceKind) -> Vec<(String, Value)> {
        lock(&self.resources)
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|((_, id), v)| (id.clone(), v.clone()))
            .collect()
    }

    /// Make every update or delete of `(kind, id)` fail with `error`.
    pub fn fail_on(&self, kind: ResourceKind, id: impl Into<String>, error: ApiError) {
        lock(&self.failures).insert((kind, id.into()), error);
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            reads: self.reads.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    fn injected(&self, key: &Key) -> Result<(), ApiError> {
        match lock(&self.failures).get(key) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

fn not_found(kind: ResourceKind, id: &str) -> ApiError {
    ApiError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[async_trait]
impl ClinicalApi for InMemoryClinicalApi {
    async fn read(&self, kind: ResourceKind, id: &str) -> Result<Value, ApiError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.get(kind, id).ok_or_else(|| not_found(kind, id))
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        mut resource: Value,
    ) -> Result<Value, ApiError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let key = (kind, id.to_string());
        self.injected(&key)?;

        let mut resources = lock(&self.resources);
        let Some(stored) = resources.get(&key) else {
            return Err(not_found(kind, id));
        };
        let stored_version = stored.pointer("/meta/versionId").and_then(Value::as_str);
        let sent_version = resource.pointer("/meta/versionId").and_then(Value::as_str);
        if let (Some(stored_version), Some(sent_version)) = (stored_version, sent_version) {
            if stored_version != sent_version {
                return Err(ApiError::Conflict {
                    kind,
                    id: id.to_string(),
                    message: format!(
                        "version {sent_version} is stale, current version is {stored_version}"
                    ),
                });
            }
        }
        let Some(root) = resource.as_object_mut() else {
            return Err(ApiError::Rejected {
                status: 400,
                message: "resource body must be a JSON object".into(),
            });
        };
        let meta = root
            .entry("meta")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(meta) = meta.as_object_mut() {
            let version = next_version(meta);
            meta.insert("versionId".into(), Value::from(version));
            meta.insert(
                "lastUpdated".into(),
                Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
        resources.insert(key, resource.clone());
        Ok(resource)
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), ApiError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let key = (kind, id.to_string());
        self.injected(&key)?;
        lock(&self.resources)
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| not_found(kind, id))
    }
}
