//! store::traits
//!
//! Document store trait and request types.
//!
//! # Design
//!
//! The store is an external dependency. Reconciliation only needs five
//! primitives from it: read one revision, read by filter, commit a
//! field-level patch, publish, and delete. Each call either succeeds or
//! returns a single [`StoreError`]; retry policy belongs to the store.
//!
//! Stores offer no multi-document transactions and no foreign keys. Callers
//! patch one document at a time and must treat each patch as independent.
//!
//! # Example
//!
//! ```
//! use refsync::core::types::{Document, DocumentId, Reference};
//! use refsync::store::memory::MemoryStore;
//! use refsync::store::{DocumentStore, Patch};
//!
//! # tokio_test::block_on(async {
//! let event = DocumentId::new("event-1").unwrap();
//! let store = MemoryStore::with_documents(vec![Document::new(event.clone(), "event")]);
//!
//! let artist = DocumentId::new("artist-1").unwrap();
//! store
//!     .patch(
//!         Patch::new(event.clone())
//!             .set_if_missing("artist", serde_json::json!([]))
//!             .append("artist", vec![Reference::keyed(&artist).to_value()]),
//!     )
//!     .await
//!     .unwrap();
//!
//! let stored = store.get(&event).await.unwrap().unwrap();
//! assert!(stored.references("artist", &artist));
//! # });
//! ```

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::core::types::{points_at, Document, DocumentId};

/// Errors from document store operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// Authentication is required but not available.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication failed (invalid token, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The document changed underneath the mutation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Publish was requested for a document without a draft.
    #[error("nothing to publish for '{0}'")]
    NothingToPublish(String),

    /// A patch operation could not be applied to the stored value.
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// A filter could not be expressed as a query.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),

    /// Local dataset could not be read or written.
    #[error("dataset i/o error: {0}")]
    Io(String),
}

/// Which revisions a filter matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RevisionScope {
    /// Published revisions only.
    #[default]
    Published,
    /// Draft revisions only.
    Drafts,
    /// Both revisions.
    All,
}

impl RevisionScope {
    /// Whether a revision id falls inside this scope.
    pub fn admits(self, id: &DocumentId) -> bool {
        match self {
            RevisionScope::Published => !id.is_draft(),
            RevisionScope::Drafts => id.is_draft(),
            RevisionScope::All => true,
        }
    }
}

/// A field holding a reference to a given document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldReference {
    pub field: String,
    pub id: DocumentId,
}

/// Read filter: `_type == T && field references id`, scoped by revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub doc_type: Option<String>,
    pub references: Option<FieldReference>,
    pub revisions: RevisionScope,
}

impl Filter {
    /// Match every published document of a type.
    pub fn of_type(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: Some(doc_type.into()),
            ..Self::default()
        }
    }

    /// Narrow to documents whose `field` references the published form of `id`.
    pub fn referencing(mut self, field: impl Into<String>, id: &DocumentId) -> Self {
        self.references = Some(FieldReference {
            field: field.into(),
            id: id.published(),
        });
        self
    }

    /// Set the revision scope.
    pub fn revisions(mut self, scope: RevisionScope) -> Self {
        self.revisions = scope;
        self
    }

    /// Evaluate the filter against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        if !self.revisions.admits(&doc.id) {
            return false;
        }
        if let Some(doc_type) = &self.doc_type {
            if &doc.doc_type != doc_type {
                return false;
            }
        }
        match &self.references {
            Some(r) => doc.references(&r.field, &r.id),
            None => true,
        }
    }
}

/// One field-level patch operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    /// Set the field only when it is absent.
    SetIfMissing { field: String, value: Value },
    /// Overwrite the field.
    Set { field: String, value: Value },
    /// Append items to an array field.
    Append { field: String, items: Vec<Value> },
    /// Remove the field.
    Unset { field: String },
}

/// A patch against one document revision, applied in operation order.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub id: DocumentId,
    pub ops: Vec<PatchOp>,
}

impl Patch {
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            ops: Vec::new(),
        }
    }

    pub fn set_if_missing(mut self, field: impl Into<String>, value: Value) -> Self {
        self.ops.push(PatchOp::SetIfMissing {
            field: field.into(),
            value,
        });
        self
    }

    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.ops.push(PatchOp::Set {
            field: field.into(),
            value,
        });
        self
    }

    pub fn append(mut self, field: impl Into<String>, items: Vec<Value>) -> Self {
        self.ops.push(PatchOp::Append {
            field: field.into(),
            items,
        });
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        self.ops.push(PatchOp::Unset {
            field: field.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every operation to a document in memory.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidPatch` when appending to a field that
    /// holds something other than an array.
    pub fn apply_to(&self, doc: &mut Document) -> Result<(), StoreError> {
        for op in &self.ops {
            match op {
                PatchOp::SetIfMissing { field, value } => {
                    doc.fields
                        .entry(field.clone())
                        .or_insert_with(|| value.clone());
                }
                PatchOp::Set { field, value } => {
                    doc.fields.insert(field.clone(), value.clone());
                }
                PatchOp::Append { field, items } => match doc.fields.get_mut(field) {
                    Some(Value::Array(existing)) => existing.extend(items.iter().cloned()),
                    Some(_) => {
                        return Err(StoreError::InvalidPatch(format!(
                            "cannot append to non-array field '{}' on '{}'",
                            field, doc.id
                        )))
                    }
                    None => {
                        return Err(StoreError::InvalidPatch(format!(
                            "cannot append to missing field '{}' on '{}'",
                            field, doc.id
                        )))
                    }
                },
                PatchOp::Unset { field } => {
                    doc.fields.remove(field);
                }
            }
        }
        Ok(())
    }
}

/// Remove every element of a reference field that points at `id`.
///
/// Returns the replacement value for the field, or `None` when nothing
/// points at `id`. A single reference pointing at `id` becomes
/// `Some(Value::Null)`, which callers translate into an unset.
pub fn without_reference(value: &Value, id: &DocumentId) -> Option<Value> {
    match value {
        Value::Array(items) => {
            let kept: Vec<Value> = items.iter().filter(|v| !points_at(v, id)).cloned().collect();
            (kept.len() != items.len()).then_some(Value::Array(kept))
        }
        single @ Value::Object(_) if points_at(single, id) => Some(Value::Null),
        _ => None,
    }
}

/// The document store trait.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
///
/// # Error Handling
///
/// All methods return `Result<T, StoreError>`. Callers decide per call
/// whether a failure is diagnostic (log and continue) or authoritative
/// (abort and surface).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get the store name (e.g., "memory", "http").
    fn name(&self) -> &'static str;

    /// Get one revision by its exact id.
    ///
    /// Returns `Ok(None)` when the revision does not exist.
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, StoreError>;

    /// Get every revision matching a filter.
    async fn fetch(&self, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Commit a patch against one revision.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the revision does not exist
    /// - `InvalidPatch` if an operation does not fit the stored value
    async fn patch(&self, patch: Patch) -> Result<(), StoreError>;

    /// Publish the draft of `id`: replace the published revision with the
    /// draft and remove the draft.
    ///
    /// # Errors
    ///
    /// - `NothingToPublish` if no draft exists
    async fn publish(&self, id: &DocumentId) -> Result<(), StoreError>;

    /// Delete one revision. Deleting a missing revision succeeds.
    async fn delete(&self, id: &DocumentId) -> Result<(), StoreError>;

    /// Get the revision an editor is working on: the draft if one exists,
    /// the published revision otherwise.
    async fn get_editing(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        if let Some(draft) = self.get(&id.draft()).await? {
            return Ok(Some(draft));
        }
        self.get(&id.published()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Reference;
    use serde_json::json;

    fn id(s: &str) -> DocumentId {
        DocumentId::new(s).unwrap()
    }

    #[test]
    fn filter_matches_type_reference_and_scope() {
        let artist = id("artist-1");
        let published = Document::new(id("event-1"), "event")
            .with_references("artist", &[&artist]);
        let mut draft = published.clone();
        draft.id = id("drafts.event-1");

        let filter = Filter::of_type("event").referencing("artist", &artist.draft());
        assert!(filter.matches(&published));
        assert!(!filter.matches(&draft));
        assert!(filter
            .clone()
            .revisions(RevisionScope::All)
            .matches(&draft));
        assert!(!Filter::of_type("artist").matches(&published));
        assert!(!Filter::of_type("event")
            .referencing("artist", &id("artist-2"))
            .matches(&published));
    }

    #[test]
    fn patch_applies_in_order() {
        let mut doc = Document::new(id("event-1"), "event");
        let r = Reference::keyed(&id("artist-1")).to_value();
        Patch::new(doc.id.clone())
            .set_if_missing("artist", json!([]))
            .append("artist", vec![r.clone()])
            .set("title", json!("Opening"))
            .apply_to(&mut doc)
            .unwrap();

        assert_eq!(doc.field("artist"), Some(&json!([r])));
        assert_eq!(doc.field("title"), Some(&json!("Opening")));

        Patch::new(doc.id.clone())
            .set_if_missing("artist", json!([]))
            .unset("title")
            .apply_to(&mut doc)
            .unwrap();
        assert_eq!(doc.field("artist").and_then(Value::as_array).map(Vec::len), Some(1));
        assert!(doc.field("title").is_none());
    }

    #[test]
    fn append_to_missing_or_scalar_field_fails() {
        let mut doc = Document::new(id("event-1"), "event").with_field("title", json!("x"));
        let missing = Patch::new(doc.id.clone()).append("artist", vec![json!(1)]);
        assert!(matches!(
            missing.apply_to(&mut doc),
            Err(StoreError::InvalidPatch(_))
        ));
        let scalar = Patch::new(doc.id.clone()).append("title", vec![json!(1)]);
        assert!(matches!(
            scalar.apply_to(&mut doc),
            Err(StoreError::InvalidPatch(_))
        ));
    }

    #[test]
    fn without_reference_filters_arrays_and_singles() {
        let x = id("artist-x");
        let keep = Reference::keyed(&id("artist-y")).to_value();
        let array = json!([Reference::keyed(&x).to_value(), keep.clone()]);
        assert_eq!(without_reference(&array, &x), Some(json!([keep])));
        assert_eq!(without_reference(&json!([keep.clone()]), &x), None);

        let single = json!({ "_type": "reference", "_ref": "artist-x" });
        assert_eq!(without_reference(&single, &x), Some(Value::Null));
        assert_eq!(without_reference(&json!("artist-x"), &x), None);
    }

    #[test]
    fn store_error_display() {
        assert_eq!(
            StoreError::NothingToPublish("a".into()).to_string(),
            "nothing to publish for 'a'"
        );
        assert_eq!(
            StoreError::ApiError {
                status: 409,
                message: "Document has been modified".into()
            }
            .to_string(),
            "API error: 409 - Document has been modified"
        );
    }
}
