//! store::http
//!
//! Document store backed by a hosted content API over HTTP.
//!
//! # Design
//!
//! This module implements the `DocumentStore` trait against a
//! Sanity-compatible content API:
//! - Reads use `GET {api}/data/query/{dataset}` with a GROQ query built from
//!   a [`Filter`] and `$`-prefixed JSON parameters
//! - Writes use `POST {api}/data/mutate/{dataset}` with a list of mutations
//!   committed as one transaction
//!
//! Publishing is a single transaction of `createOrReplace` (published id,
//! draft content) and `delete` (draft id). Patches become one `patch`
//! mutation per operation so operation order is preserved.
//!
//! # Rate Limiting
//!
//! Returns `StoreError::RateLimited` on HTTP 429. Retrying is the caller's
//! decision; the workflows never retry automatically.
//!
//! # Example
//!
//! ```ignore
//! use refsync::store::http::HttpStore;
//! use refsync::store::DocumentStore;
//!
//! let store = HttpStore::new("abc123", "production", "2021-10-21", Some(token));
//! let doc = store.get(&id).await?;
//! ```

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::traits::{DocumentStore, Filter, Patch, PatchOp, RevisionScope, StoreError};
use crate::core::types::{Document, DocumentId};

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "refsync-cli";

/// Content API store.
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    api_base: String,
    dataset: String,
    token: Option<String>,
}

/// Envelope of a query response.
#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    result: T,
}

impl HttpStore {
    /// Create a store for a hosted project.
    ///
    /// The API base is `https://{project_id}.api.sanity.io/v{api_version}`.
    pub fn new(
        project_id: &str,
        dataset: impl Into<String>,
        api_version: &str,
        token: Option<String>,
    ) -> Self {
        Self::with_api_base(
            format!("https://{project_id}.api.sanity.io/v{api_version}"),
            dataset,
            token,
        )
    }

    /// Create a store against an explicit API base URL (used for testing
    /// and self-hosted gateways).
    pub fn with_api_base(
        api_base: impl Into<String>,
        dataset: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            dataset: dataset.into(),
            token,
        }
    }

    /// Whether a bearer token is configured.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn headers(&self) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| StoreError::AuthFailed("token contains invalid characters".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn query_url(&self) -> String {
        format!("{}/data/query/{}", self.api_base, self.dataset)
    }

    fn mutate_url(&self) -> String {
        format!("{}/data/mutate/{}", self.api_base, self.dataset)
    }

    /// Run a GROQ query with JSON-encoded parameters.
    async fn query<T: DeserializeOwned>(
        &self,
        groq: &str,
        params: &[(String, Value)],
    ) -> Result<T, StoreError> {
        let mut pairs = vec![("query".to_string(), groq.to_string())];
        pairs.extend(
            params
                .iter()
                .map(|(name, value)| (format!("${name}"), value.to_string())),
        );

        debug!(query = groq, "content API query");
        let response = self
            .client
            .get(self.query_url())
            .headers(self.headers()?)
            .query(&pairs)
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        let envelope: QueryResponse<T> = self.handle_response(response).await?;
        Ok(envelope.result)
    }

    /// Commit mutations as one transaction.
    async fn mutate(&self, mutations: Vec<Value>) -> Result<(), StoreError> {
        if self.token.is_none() {
            return Err(StoreError::AuthRequired);
        }
        debug!(count = mutations.len(), "content API mutate");
        let response = self
            .client
            .post(self.mutate_url())
            .headers(self.headers()?)
            .json(&json!({ "mutations": mutations }))
            .send()
            .await
            .map_err(|e| StoreError::NetworkError(e.to_string()))?;

        let _: Value = self.handle_response(response).await?;
        Ok(())
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
    ) -> Result<T, StoreError> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| StoreError::ApiError {
                status: status.as_u16(),
                message: format!("Failed to parse response: {e}"),
            });
        }

        let message = match response.json::<Value>().await {
            Ok(body) => error_message(&body),
            Err(_) => "Unknown error".to_string(),
        };

        Err(match status {
            StatusCode::UNAUTHORIZED => StoreError::AuthFailed("Invalid or expired token".into()),
            StatusCode::FORBIDDEN => StoreError::AuthFailed(format!("Permission denied: {message}")),
            StatusCode::NOT_FOUND => StoreError::NotFound(message),
            StatusCode::CONFLICT => StoreError::Conflict(message),
            StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited,
            _ if status.is_server_error() => StoreError::ApiError {
                status: status.as_u16(),
                message: format!("content API server error: {message}"),
            },
            _ => StoreError::ApiError {
                status: status.as_u16(),
                message,
            },
        })
    }
}

/// Pull a human-readable message out of an API error body.
fn error_message(body: &Value) -> String {
    body.pointer("/error/description")
        .or_else(|| body.pointer("/error/message"))
        .or_else(|| body.get("message"))
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string()
}

/// Field names are interpolated into GROQ, so only plain identifiers pass.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Build a GROQ query and its parameters from a filter.
pub fn filter_to_groq(filter: &Filter) -> Result<(String, Vec<(String, Value)>), StoreError> {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    if let Some(doc_type) = &filter.doc_type {
        conditions.push("_type == $type".to_string());
        params.push(("type".to_string(), Value::String(doc_type.clone())));
    }

    if let Some(reference) = &filter.references {
        if !is_identifier(&reference.field) {
            return Err(StoreError::InvalidQuery(format!(
                "field '{}' is not a plain identifier",
                reference.field
            )));
        }
        let field = &reference.field;
        conditions.push(format!("($ref in {field}[]._ref || {field}._ref == $ref)"));
        params.push(("ref".to_string(), Value::String(reference.id.to_string())));
    }

    match filter.revisions {
        RevisionScope::Published => conditions.push("!(_id in path(\"drafts.**\"))".to_string()),
        RevisionScope::Drafts => conditions.push("_id in path(\"drafts.**\")".to_string()),
        RevisionScope::All => {}
    }

    let query = if conditions.is_empty() {
        "*".to_string()
    } else {
        format!("*[{}]", conditions.join(" && "))
    };
    Ok((query, params))
}

/// Translate a patch into content API mutations, one per operation.
pub fn patch_mutations(patch: &Patch) -> Vec<Value> {
    let id = patch.id.as_str();
    patch
        .ops
        .iter()
        .map(|op| {
            let body = match op {
                PatchOp::SetIfMissing { field, value } => json!({ "setIfMissing": { field: value } }),
                PatchOp::Set { field, value } => json!({ "set": { field: value } }),
                PatchOp::Append { field, items } => json!({
                    "insert": { "after": format!("{field}[-1]"), "items": items }
                }),
                PatchOp::Unset { field } => json!({ "unset": [field] }),
            };
            let mut inner = Map::new();
            inner.insert("id".into(), Value::String(id.to_string()));
            if let Value::Object(ops) = body {
                inner.extend(ops);
            }
            json!({ "patch": inner })
        })
        .collect()
}

#[async_trait]
impl DocumentStore for HttpStore {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        self.query(
            "*[_id == $id][0]",
            &[("id".to_string(), Value::String(id.to_string()))],
        )
        .await
    }

    async fn fetch(&self, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let (groq, params) = filter_to_groq(filter)?;
        self.query(&groq, &params).await
    }

    async fn patch(&self, patch: Patch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        self.mutate(patch_mutations(&patch)).await
    }

    async fn publish(&self, id: &DocumentId) -> Result<(), StoreError> {
        let draft_id = id.draft();
        let mut draft = self
            .get(&draft_id)
            .await?
            .ok_or_else(|| StoreError::NothingToPublish(id.published().to_string()))?;

        draft.id = id.published();
        draft.rev = None;
        draft.updated_at = None;
        let published = serde_json::to_value(&draft).map_err(|e| StoreError::ApiError {
            status: 0,
            message: format!("failed to encode document: {e}"),
        })?;

        self.mutate(vec![
            json!({ "createOrReplace": published }),
            json!({ "delete": { "id": draft_id.as_str() } }),
        ])
        .await
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        self.mutate(vec![json!({ "delete": { "id": id.as_str() } })])
            .await
    }
}
