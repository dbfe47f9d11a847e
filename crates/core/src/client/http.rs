use super::ClinicalApi;
use crate::constants::FHIR_JSON_MEDIA_TYPE;
use crate::{ApiError, SyncError, SyncResult};
use async_trait::async_trait;
use clinsync_types::ResourceKind;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, IF_MATCH};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// A [`ClinicalApi`] speaking FHIR REST over HTTP.
///
/// Resources live at `{base}/{resourceType}/{id}`. Kinds backed by several resource types
/// (orders) are tried type by type until one is found.
pub struct HttpClinicalApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClinicalApi {
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if the base URL is blank, the token is not a valid header
    /// value, or the HTTP client cannot be built.
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> SyncResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SyncError::Config("API base URL cannot be empty".into()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(FHIR_JSON_MEDIA_TYPE));
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| SyncError::Config(format!("invalid API token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    fn resource_url(&self, resource_type: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, resource_type, id)
    }

    /// PUT for `resource`, conditional on the `meta.versionId` it was read at.
    ///
    /// A server holding a newer version answers 412, which surfaces as [`ApiError::Conflict`].
    fn update_request(
        &self,
        kind: ResourceKind,
        id: &str,
        resource: &Value,
    ) -> reqwest::RequestBuilder {
        let resource_type = resource
            .get("resourceType")
            .and_then(Value::as_str)
            .and_then(|rt| kind.resource_types().iter().copied().find(|k| *k == rt))
            .unwrap_or_else(|| kind.primary_resource_type());
        let mut request = self
            .client
            .put(self.resource_url(resource_type, id))
            .header(CONTENT_TYPE, FHIR_JSON_MEDIA_TYPE)
            .body(resource.to_string());
        if let Some(version) = resource
            .pointer("/meta/versionId")
            .and_then(Value::as_str)
            .filter(|v| !v.trim().is_empty())
        {
            request = request.header(IF_MATCH, format!("W/\"{version}\""));
        }
        request
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        kind: ResourceKind,
        id: &str,
    ) -> Result<(StatusCode, String), ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if status.is_success() {
            Ok((status, body))
        } else {
            Err(error_for_status(kind, id, status.as_u16(), &body))
        }
    }

    /// First resource type of `kind` under which `id` exists, with its body.
    async fn locate(&self, kind: ResourceKind, id: &str) -> Result<(&'static str, Value), ApiError> {
        for &resource_type in kind.resource_types() {
            let request = self.client.get(self.resource_url(resource_type, id));
            match self.send(request, kind, id).await {
                Ok((_, body)) => {
                    let value = serde_json::from_str(&body).map_err(|e| {
                        ApiError::Transport(format!("invalid JSON from server: {e}"))
                    })?;
                    return Ok((resource_type, value));
                }
                Err(ApiError::NotFound { .. }) => continue,
                Err(other) => return Err(other),
            }
        }
        Err(ApiError::NotFound {
            kind,
            id: id.to_string(),
        })
    }
}

/// Map a non-success HTTP response onto an [`ApiError`].
fn error_for_status(kind: ResourceKind, id: &str, status: u16, body: &str) -> ApiError {
    let message = outcome_diagnostics(body).unwrap_or_else(|| {
        StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("request failed")
            .to_string()
    });
    match status {
        404 | 410 => ApiError::NotFound {
            kind,
            id: id.to_string(),
        },
        409 | 412 => ApiError::Conflict {
            kind,
            id: id.to_string(),
            message,
        },
        _ => ApiError::Rejected { status, message },
    }
}

/// First `OperationOutcome.issue` diagnostics (or details text) in a response body.
fn outcome_diagnostics(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    if value.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome") {
        return None;
    }
    value
        .get("issue")?
        .as_array()?
        .iter()
        .find_map(|issue| {
            issue
                .get("diagnostics")
                .and_then(Value::as_str)
                .or_else(|| issue.pointer("/details/text").and_then(Value::as_str))
        })
        .map(str::to_string)
}

#[async_trait]
impl ClinicalApi for HttpClinicalApi {
    async fn read(&self, kind: ResourceKind, id: &str) -> Result<Value, ApiError> {
        self.locate(kind, id).await.map(|(_, value)| value)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        resource: Value,
    ) -> Result<Value, ApiError> {
        let request = self.update_request(kind, id, &resource);
        let (_, body) = self.send(request, kind, id).await?;
        if body.trim().is_empty() {
            return Ok(resource);
        }
        serde_json::from_str(&body)
            .map_err(|e| ApiError::Transport(format!("invalid JSON from server: {e}")))
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), ApiError> {
        let (resource_type, _) = self.locate(kind, id).await?;
        let request = self.client.delete(self.resource_url(resource_type, id));
        self.send(request, kind, id).await.map(|_| ())
    }
}
