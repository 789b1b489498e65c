//! store::memory
//!
//! In-memory document store for tests and dry runs.
//!
//! # Design
//!
//! The memory store provides a deterministic implementation of the
//! `DocumentStore` trait. It keeps revisions in a sorted map, records every
//! call, and can be configured to fail specific operations (optionally for a
//! single document id) to exercise the best-effort paths.
//!
//! Every write refreshes `_rev` (a content fingerprint) and `_updatedAt`.
//!
//! # Example
//!
//! ```
//! use refsync::core::types::{Document, DocumentId};
//! use refsync::store::memory::{FailOn, MemoryStore};
//! use refsync::store::{DocumentStore, StoreError};
//!
//! # tokio_test::block_on(async {
//! let id = DocumentId::new("drafts.artist-1").unwrap();
//! let store = MemoryStore::with_documents(vec![Document::new(id.clone(), "artist")])
//!     .fail_on(FailOn::Publish(StoreError::RateLimited));
//!
//! assert!(store.publish(&id).await.is_err());
//! store.clear_fail_on();
//! store.publish(&id).await.unwrap();
//! assert!(store.document(&id.published()).is_some());
//! # });
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};

use super::traits::{DocumentStore, Filter, Patch, StoreError};
use crate::core::types::{Document, DocumentId};

/// Memory store.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    documents: BTreeMap<DocumentId, Document>,
    fail_on: Vec<FailOn>,
    operations: Vec<StoreOperation>,
}

/// Configuration for which operation should fail.
///
/// A `None` id fails the operation for every document.
#[derive(Debug, Clone)]
pub enum FailOn {
    Get {
        id: Option<DocumentId>,
        error: StoreError,
    },
    Fetch(StoreError),
    Patch {
        id: Option<DocumentId>,
        error: StoreError,
    },
    Publish(StoreError),
    Delete {
        id: Option<DocumentId>,
        error: StoreError,
    },
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOperation {
    Get { id: DocumentId },
    Fetch { filter: Filter },
    Patch { patch: Patch },
    Publish { id: DocumentId },
    Delete { id: DocumentId },
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given revisions.
    pub fn with_documents(documents: Vec<Document>) -> Self {
        let store = Self::new();
        for doc in documents {
            store.insert(doc);
        }
        store
    }

    /// Configure the store to fail an operation. Calls accumulate.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.state().fail_on.push(fail_on);
        self
    }

    /// Clear all failure configuration.
    pub fn clear_fail_on(&self) {
        self.state().fail_on.clear();
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<StoreOperation> {
        self.state().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.state().operations.clear();
    }

    /// Insert or replace a revision directly, bypassing recording.
    pub fn insert(&self, mut doc: Document) {
        stamp(&mut doc);
        self.state().documents.insert(doc.id.clone(), doc);
    }

    /// Get a revision (for test verification).
    pub fn document(&self, id: &DocumentId) -> Option<Document> {
        self.state().documents.get(id).cloned()
    }

    /// All revisions in id order.
    pub fn all_documents(&self) -> Vec<Document> {
        self.state().documents.values().cloned().collect()
    }

    /// Number of stored revisions.
    pub fn len(&self) -> usize {
        self.state().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn state(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, op: StoreOperation) {
        self.state().operations.push(op);
    }

    /// Check if we should fail and return the error if so.
    fn check_fail(&self, op: &str, id: Option<&DocumentId>) -> Result<(), StoreError> {
        let inner = self.state();
        let applies = |target: &Option<DocumentId>| match (target, id) {
            (None, _) => true,
            (Some(target), Some(id)) => target == id,
            (Some(_), None) => false,
        };
        for fail in &inner.fail_on {
            let hit = match fail {
                FailOn::Get { id, error } if op == "get" && applies(id) => Some(error),
                FailOn::Fetch(error) if op == "fetch" => Some(error),
                FailOn::Patch { id, error } if op == "patch" && applies(id) => Some(error),
                FailOn::Publish(error) if op == "publish" => Some(error),
                FailOn::Delete { id, error } if op == "delete" && applies(id) => Some(error),
                _ => None,
            };
            if let Some(error) = hit {
                return Err(error.clone());
            }
        }
        Ok(())
    }
}

/// Refresh the revision fingerprint and update timestamp.
fn stamp(doc: &mut Document) {
    let mut hasher = Sha256::new();
    hasher.update(doc.id.as_str().as_bytes());
    hasher.update(serde_json::Value::Object(doc.fields.clone()).to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    doc.rev = Some(digest[..12].to_string());
    doc.updated_at = Some(Utc::now());
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        self.record(StoreOperation::Get { id: id.clone() });
        self.check_fail("get", Some(id))?;
        Ok(self.state().documents.get(id).cloned())
    }

    async fn fetch(&self, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        self.record(StoreOperation::Fetch {
            filter: filter.clone(),
        });
        self.check_fail("fetch", None)?;
        Ok(self
            .state()
            .documents
            .values()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect())
    }

    async fn patch(&self, patch: Patch) -> Result<(), StoreError> {
        self.record(StoreOperation::Patch {
            patch: patch.clone(),
        });
        self.check_fail("patch", Some(&patch.id))?;

        let mut inner = self.state();
        let doc = inner
            .documents
            .get_mut(&patch.id)
            .ok_or_else(|| StoreError::NotFound(patch.id.to_string()))?;

        // Apply to a copy so a failing operation leaves the revision untouched.
        let mut updated = doc.clone();
        patch.apply_to(&mut updated)?;
        stamp(&mut updated);
        *doc = updated;
        Ok(())
    }

    async fn publish(&self, id: &DocumentId) -> Result<(), StoreError> {
        self.record(StoreOperation::Publish { id: id.clone() });
        self.check_fail("publish", Some(id))?;

        let mut inner = self.state();
        let mut draft = inner
            .documents
            .remove(&id.draft())
            .ok_or_else(|| StoreError::NothingToPublish(id.published().to_string()))?;
        draft.id = id.published();
        stamp(&mut draft);
        inner.documents.insert(draft.id.clone(), draft);
        Ok(())
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        self.record(StoreOperation::Delete { id: id.clone() });
        self.check_fail("delete", Some(id))?;
        self.state().documents.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RevisionScope;
    use serde_json::json;

    fn id(s: &str) -> DocumentId {
        DocumentId::new(s).unwrap()
    }

    #[tokio::test]
    async fn publish_moves_draft_to_published() {
        let store = MemoryStore::with_documents(vec![
            Document::new(id("drafts.a"), "artist").with_field("name", json!("New")),
            Document::new(id("a"), "artist").with_field("name", json!("Old")),
        ]);

        store.publish(&id("a")).await.unwrap();

        assert!(store.document(&id("drafts.a")).is_none());
        let published = store.document(&id("a")).unwrap();
        assert_eq!(published.field("name"), Some(&json!("New")));
        assert!(published.rev.is_some());
    }

    #[tokio::test]
    async fn publish_without_draft_fails() {
        let store = MemoryStore::with_documents(vec![Document::new(id("a"), "artist")]);
        let result = store.publish(&id("a")).await;
        assert_eq!(result, Err(StoreError::NothingToPublish("a".into())));
    }

    #[tokio::test]
    async fn delete_missing_revision_succeeds() {
        let store = MemoryStore::new();
        assert!(store.delete(&id("drafts.nope")).await.is_ok());
    }

    #[tokio::test]
    async fn patch_missing_document_fails() {
        let store = MemoryStore::new();
        let result = store
            .patch(Patch::new(id("nope")).set("x", json!(1)))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn failed_patch_leaves_revision_untouched() {
        let store = MemoryStore::with_documents(vec![
            Document::new(id("e"), "event").with_field("title", json!("x"))
        ]);
        let result = store
            .patch(
                Patch::new(id("e"))
                    .set("sortDate", json!("2024"))
                    .append("title", vec![json!(1)]),
            )
            .await;
        assert!(result.is_err());
        assert!(store.document(&id("e")).unwrap().field("sortDate").is_none());
    }

    #[tokio::test]
    async fn patch_refreshes_rev() {
        let store = MemoryStore::with_documents(vec![Document::new(id("e"), "event")]);
        let before = store.document(&id("e")).unwrap().rev;
        store
            .patch(Patch::new(id("e")).set("title", json!("Gala")))
            .await
            .unwrap();
        assert_ne!(store.document(&id("e")).unwrap().rev, before);
    }

    #[tokio::test]
    async fn fail_on_single_id() {
        let store = MemoryStore::with_documents(vec![
            Document::new(id("a"), "artist"),
            Document::new(id("b"), "artist"),
        ])
        .fail_on(FailOn::Get {
            id: Some(id("b")),
            error: StoreError::NetworkError("reset".into()),
        });

        assert!(store.get(&id("a")).await.unwrap().is_some());
        assert!(matches!(
            store.get(&id("b")).await,
            Err(StoreError::NetworkError(_))
        ));
    }

    #[tokio::test]
    async fn get_editing_prefers_draft() {
        let store = MemoryStore::with_documents(vec![
            Document::new(id("a"), "artist").with_field("name", json!("Published")),
        ]);
        let doc = store.get_editing(&id("a")).await.unwrap().unwrap();
        assert_eq!(doc.id, id("a"));

        store.insert(Document::new(id("drafts.a"), "artist").with_field("name", json!("Draft")));
        let doc = store.get_editing(&id("a")).await.unwrap().unwrap();
        assert_eq!(doc.id, id("drafts.a"));
    }

    #[tokio::test]
    async fn fetch_respects_scope_and_records() {
        let artist = id("artist-1");
        let store = MemoryStore::with_documents(vec![
            Document::new(id("e1"), "event").with_references("artist", &[&artist]),
            Document::new(id("drafts.e2"), "event").with_references("artist", &[&artist]),
            Document::new(id("e3"), "event"),
        ]);

        let filter = Filter::of_type("event").referencing("artist", &artist);
        let published = store.fetch(&filter).await.unwrap();
        assert_eq!(published.len(), 1);

        let all = store
            .fetch(&filter.clone().revisions(RevisionScope::All))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        assert!(matches!(
            store.operations()[0],
            StoreOperation::Fetch { .. }
        ));
    }
}
