//! Clinical-data API collaborators.
//!
//! The executor talks to the upstream store only through [`ClinicalApi`]. Every method fails
//! with an [`ApiError`], which the executor turns into a per-item failure.

mod http;
mod memory;

pub use http::HttpClinicalApi;
pub use memory::{CallCounts, InMemoryClinicalApi};

use crate::ApiError;
use async_trait::async_trait;
use clinsync_types::ResourceKind;
use serde_json::Value;

/// Narrow read/update/delete interface to the clinical-data store.
#[async_trait]
pub trait ClinicalApi: Send + Sync {
    /// Fetch the current wire resource.
    async fn read(&self, kind: ResourceKind, id: &str) -> Result<Value, ApiError>;

    /// Replace the resource and return what the store now holds.
    async fn update(&self, kind: ResourceKind, id: &str, resource: Value)
        -> Result<Value, ApiError>;

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), ApiError>;
}
