//! sync::derived
//!
//! Mirror a scalar from a referenced document into a sort key.
//!
//! The derived field is a cache. It is refreshed on the revision being
//! edited just before publish, so the published revision carries the new
//! value. Failures never propagate: publishing with a stale sort key is
//! preferable to not publishing.

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::registry::DerivedField;
use crate::core::types::DocumentId;
use crate::store::{DocumentStore, Patch};

/// What [`sync_derived_field`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The reference field is empty.
    NoReference,
    /// The referenced document has no value at the source path.
    NoValue,
    /// The derived field already holds the value.
    Unchanged,
    /// The derived field was set to this value.
    Updated(Value),
    /// A read or patch failed; the message was logged.
    Failed(String),
}

/// Copy `derived.source_value_path` of the referenced document into
/// `derived.target_field` of `doc_id`.
pub async fn sync_derived_field(
    store: &dyn DocumentStore,
    doc_id: &DocumentId,
    derived: &DerivedField,
) -> SyncOutcome {
    let doc = match store.get_editing(doc_id).await {
        Ok(Some(doc)) => doc,
        Ok(None) => return failed(doc_id, format!("document '{}' not found", doc_id.published())),
        Err(e) => return failed(doc_id, e.to_string()),
    };

    let Some(referenced_id) = doc.reference_ids(&derived.reference_field).into_iter().next() else {
        debug!(doc_id = %doc.id, field = %derived.reference_field, "no reference to derive from");
        return SyncOutcome::NoReference;
    };

    let referenced = match store.get(&referenced_id).await {
        Ok(Some(referenced)) => referenced,
        Ok(None) => {
            debug!(doc_id = %doc.id, referenced = %referenced_id, "referenced document not published");
            return SyncOutcome::NoValue;
        }
        Err(e) => return failed(doc_id, e.to_string()),
    };

    let Some(value) = referenced
        .get_path(&derived.source_value_path)
        .filter(|v| !v.is_null())
        .cloned()
    else {
        return SyncOutcome::NoValue;
    };

    if doc.field(&derived.target_field) == Some(&value) {
        return SyncOutcome::Unchanged;
    }

    let patch = Patch::new(doc.id.clone()).set(derived.target_field.as_str(), value.clone());
    match store.patch(patch).await {
        Ok(()) => {
            debug!(doc_id = %doc.id, field = %derived.target_field, value = %value, "derived field updated");
            SyncOutcome::Updated(value)
        }
        Err(e) => failed(doc_id, e.to_string()),
    }
}

fn failed(doc_id: &DocumentId, message: String) -> SyncOutcome {
    warn!(doc_id = %doc_id, error = %message, "derived field sync failed");
    SyncOutcome::Failed(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Document;
    use crate::store::memory::{FailOn, MemoryStore};
    use crate::store::StoreError;
    use serde_json::json;

    fn id(s: &str) -> DocumentId {
        DocumentId::new(s).unwrap()
    }

    fn sort_date() -> DerivedField {
        DerivedField {
            reference_field: "date".into(),
            target_field: "sortDate".into(),
            source_value_path: "date".into(),
        }
    }

    fn event_draft(date_ref: Option<&str>) -> Document {
        let doc = Document::new(id("drafts.event-1"), "event");
        match date_ref {
            Some(r) => doc.with_field("date", json!({ "_type": "reference", "_ref": r })),
            None => doc,
        }
    }

    #[tokio::test]
    async fn copies_value_onto_draft() {
        let store = MemoryStore::with_documents(vec![
            Document::new(id("event-1"), "event"),
            event_draft(Some("date-1")),
            Document::new(id("date-1"), "eventDate").with_field("date", json!("2024-06-01")),
        ]);

        let outcome = sync_derived_field(&store, &id("event-1"), &sort_date()).await;
        assert_eq!(outcome, SyncOutcome::Updated(json!("2024-06-01")));

        let draft = store.document(&id("drafts.event-1")).unwrap();
        assert_eq!(draft.field("sortDate"), Some(&json!("2024-06-01")));
        assert!(store.document(&id("event-1")).unwrap().field("sortDate").is_none());

        let again = sync_derived_field(&store, &id("event-1"), &sort_date()).await;
        assert_eq!(again, SyncOutcome::Unchanged);
    }

    #[tokio::test]
    async fn no_reference_is_noop() {
        let store = MemoryStore::with_documents(vec![event_draft(None)]);
        let outcome = sync_derived_field(&store, &id("event-1"), &sort_date()).await;
        assert_eq!(outcome, SyncOutcome::NoReference);
    }

    #[tokio::test]
    async fn missing_value_is_noop() {
        let store = MemoryStore::with_documents(vec![
            event_draft(Some("date-1")),
            Document::new(id("date-1"), "eventDate"),
        ]);
        let outcome = sync_derived_field(&store, &id("event-1"), &sort_date()).await;
        assert_eq!(outcome, SyncOutcome::NoValue);
    }

    #[tokio::test]
    async fn fetch_failure_is_reported_not_raised() {
        let store = MemoryStore::with_documents(vec![
            event_draft(Some("date-1")),
            Document::new(id("date-1"), "eventDate").with_field("date", json!("2024-06-01")),
        ])
        .fail_on(FailOn::Get {
            id: Some(id("date-1")),
            error: StoreError::NetworkError("reset".into()),
        });

        let outcome = sync_derived_field(&store, &id("event-1"), &sort_date()).await;
        assert!(matches!(outcome, SyncOutcome::Failed(_)));
        assert!(store.document(&id("drafts.event-1")).unwrap().field("sortDate").is_none());
    }
}
