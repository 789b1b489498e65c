//! sync::patch
//!
//! Repairs for reciprocal reference fields.
//!
//! Every target is patched on its own. The store has no multi-document
//! transactions, so a failure on one target is recorded in the
//! [`PatchReport`] and the loop moves on to the next one.
//!
//! Additions re-read each target before appending, which makes
//! [`add_reciprocal`] safe to run twice with the same inputs.
//!
//! A target is repaired in every revision it has. Publishing a draft
//! replaces the published revision, so a repair made only to the published
//! side would be undone by the target's next publish.

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::diff::TargetFailure;
use crate::core::registry::ListingPage;
use crate::core::types::{Document, DocumentId, Reference};
use crate::store::{without_reference, DocumentStore, Patch, StoreError};

/// Per-target outcome of a repair step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchReport {
    /// Targets that were patched.
    pub applied: Vec<DocumentId>,
    /// Targets that needed no change.
    pub skipped: Vec<DocumentId>,
    /// Targets whose read or patch failed.
    pub failures: Vec<TargetFailure>,
}

impl PatchReport {
    /// Whether every target was either patched or already correct.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// File a target under applied or skipped. Failed targets are already
    /// in `failures`.
    fn record(&mut self, target: DocumentId, outcome: RevisionOutcome) {
        if outcome.failed {
            return;
        }
        if outcome.patched {
            self.applied.push(target);
        } else {
            self.skipped.push(target);
        }
    }

    fn fail(&mut self, id: &DocumentId, error: StoreError) {
        warn!(target = %id, error = %error, "reference repair failed");
        self.failures.push(TargetFailure {
            id: id.clone(),
            error,
        });
    }
}

/// Outcome of offering a document to its listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingOutcome {
    Added,
    AlreadyPresent,
}

/// Append a reference to `source_id` on every target that lacks one.
///
/// Both revisions of a target are repaired: the draft, when one exists,
/// would otherwise drop the reference on its next publish. Both receive
/// the same element, key included.
pub async fn add_reciprocal(
    store: &dyn DocumentStore,
    target_ids: &[DocumentId],
    source_id: &DocumentId,
    target_field: &str,
) -> PatchReport {
    let mut report = PatchReport::default();

    for target in target_ids {
        let target = target.published();
        let revisions = match revisions(store, &target).await {
            Ok(revisions) => revisions,
            Err(e) => {
                report.fail(&target, e);
                continue;
            }
        };

        let reference = Reference::keyed(source_id).to_value();
        let mut outcome = RevisionOutcome::default();
        for doc in revisions
            .iter()
            .filter(|doc| !doc.references(target_field, source_id))
        {
            let patch = Patch::new(doc.id.clone())
                .set_if_missing(target_field, json!([]))
                .append(target_field, vec![reference.clone()]);
            match store.patch(patch).await {
                Ok(()) => {
                    debug!(target = %doc.id, field = target_field, source = %source_id.published(), "added reference");
                    outcome.patched = true;
                }
                Err(e) => {
                    report.fail(&doc.id, e);
                    outcome.failed = true;
                }
            }
        }
        if outcome.is_unchanged() {
            debug!(target = %target, field = target_field, "reference already present");
        }
        report.record(target, outcome);
    }

    report
}

/// Drop every element of `target_field` that points at `source_id`.
///
/// A single-valued reference field pointing at the source is unset. Both
/// revisions of a target are filtered so a pending draft cannot bring the
/// reference back on publish.
pub async fn remove_reciprocal(
    store: &dyn DocumentStore,
    target_ids: &[DocumentId],
    source_id: &DocumentId,
    target_field: &str,
) -> PatchReport {
    let mut report = PatchReport::default();

    for target in target_ids {
        let target = target.published();
        let revisions = match revisions(store, &target).await {
            Ok(revisions) => revisions,
            Err(e) => {
                report.fail(&target, e);
                continue;
            }
        };

        let mut outcome = RevisionOutcome::default();
        for doc in &revisions {
            let Some(replacement) = doc
                .field(target_field)
                .and_then(|value| without_reference(value, source_id))
            else {
                continue;
            };
            match store.patch(strip_patch(&doc.id, target_field, replacement)).await {
                Ok(()) => {
                    debug!(target = %doc.id, field = target_field, source = %source_id.published(), "removed reference");
                    outcome.patched = true;
                }
                Err(e) => {
                    report.fail(&doc.id, e);
                    outcome.failed = true;
                }
            }
        }
        report.record(target, outcome);
    }

    report
}

/// What happened to the revisions of one target.
#[derive(Debug, Default)]
struct RevisionOutcome {
    patched: bool,
    failed: bool,
}

impl RevisionOutcome {
    fn is_unchanged(&self) -> bool {
        !self.patched && !self.failed
    }
}

/// The existing revisions of a target, draft first.
///
/// # Errors
///
/// Returns `StoreError::NotFound` when neither revision exists.
async fn revisions(
    store: &dyn DocumentStore,
    target: &DocumentId,
) -> Result<Vec<Document>, StoreError> {
    let mut found = Vec::with_capacity(2);
    for id in [target.draft(), target.published()] {
        if let Some(doc) = store.get(&id).await? {
            found.push(doc);
        }
    }
    if found.is_empty() {
        return Err(StoreError::NotFound(target.to_string()));
    }
    Ok(found)
}

/// Build the patch that writes a filtered reference field back.
pub(crate) fn strip_patch(id: &DocumentId, field: &str, replacement: Value) -> Patch {
    match replacement {
        Value::Null => Patch::new(id.clone()).unset(field),
        value => Patch::new(id.clone()).set(field, value),
    }
}

/// Whether the listing page already references `id`.
///
/// # Errors
///
/// Returns `StoreError::NotFound` if the listing document does not exist.
pub async fn listing_contains(
    store: &dyn DocumentStore,
    listing: &ListingPage,
    id: &DocumentId,
) -> Result<bool, StoreError> {
    let page = store
        .get(&listing.document_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(listing.document_id.to_string()))?;
    Ok(page.references(&listing.field, id))
}

/// Append `id` to the listing page unless it is already there.
///
/// # Errors
///
/// Returns the store error if the listing page cannot be read or patched.
pub async fn add_to_listing(
    store: &dyn DocumentStore,
    listing: &ListingPage,
    id: &DocumentId,
) -> Result<ListingOutcome, StoreError> {
    if listing_contains(store, listing, id).await? {
        return Ok(ListingOutcome::AlreadyPresent);
    }

    store
        .patch(
            Patch::new(listing.document_id.clone())
                .set_if_missing(listing.field.as_str(), json!([]))
                .append(listing.field.as_str(), vec![Reference::keyed(id).to_value()]),
        )
        .await?;
    debug!(listing = %listing.document_id, id = %id.published(), "added to listing page");
    Ok(ListingOutcome::Added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{points_at, Document};
    use crate::store::memory::{FailOn, MemoryStore};

    fn id(s: &str) -> DocumentId {
        DocumentId::new(s).unwrap()
    }

    fn count_refs(store: &MemoryStore, doc: &DocumentId, field: &str, to: &DocumentId) -> usize {
        store
            .document(doc)
            .and_then(|d| d.field(field).cloned())
            .and_then(|v| v.as_array().cloned())
            .map(|items| items.iter().filter(|v| points_at(v, to)).count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let x = id("artist-x");
        let targets = vec![id("event-1"), id("event-2")];
        let store = MemoryStore::with_documents(vec![
            Document::new(id("event-1"), "event"),
            Document::new(id("event-2"), "event").with_references("artist", &[&id("artist-y")]),
        ]);

        let first = add_reciprocal(&store, &targets, &x, "artist").await;
        assert_eq!(first.applied, targets);

        let second = add_reciprocal(&store, &targets, &x, "artist").await;
        assert!(second.applied.is_empty());
        assert_eq!(second.skipped, targets);

        for target in &targets {
            assert_eq!(count_refs(&store, target, "artist", &x), 1);
        }
        assert_eq!(count_refs(&store, &id("event-2"), "artist", &id("artist-y")), 1);
    }

    #[tokio::test]
    async fn add_uses_published_source_id_and_fresh_keys() {
        let store = MemoryStore::with_documents(vec![Document::new(id("page"), "page")]);
        add_reciprocal(&store, &[id("page")], &id("drafts.a"), "items").await;
        add_reciprocal(&store, &[id("page")], &id("b"), "items").await;

        let doc = store.document(&id("page")).unwrap();
        let items = doc.field("items").and_then(Value::as_array).unwrap().clone();
        assert!(points_at(&items[0], &id("a")));
        assert_eq!(items[0]["_ref"], "a");
        assert_ne!(items[0]["_key"], items[1]["_key"]);
    }

    #[tokio::test]
    async fn add_continues_past_failures() {
        let x = id("artist-x");
        let store = MemoryStore::with_documents(vec![
            Document::new(id("event-1"), "event"),
            Document::new(id("event-2"), "event"),
        ])
        .fail_on(FailOn::Patch {
            id: Some(id("event-1")),
            error: StoreError::Conflict("rev mismatch".into()),
        });

        let report = add_reciprocal(
            &store,
            &[id("event-1"), id("event-missing"), id("event-2")],
            &x,
            "artist",
        )
        .await;

        assert_eq!(report.applied, vec![id("event-2")]);
        let failed: Vec<_> = report.failures.iter().map(|f| f.id.clone()).collect();
        assert_eq!(failed, vec![id("event-1"), id("event-missing")]);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn add_patches_draft_and_published_revisions() {
        let x = id("artist-x");
        let store = MemoryStore::with_documents(vec![
            Document::new(id("event-1"), "event"),
            Document::new(id("event-1").draft(), "event"),
            Document::new(id("event-new").draft(), "event"),
        ]);

        let report = add_reciprocal(&store, &[id("event-1"), id("event-new")], &x, "artist").await;
        assert_eq!(report.applied, vec![id("event-1"), id("event-new")]);
        assert!(report.failures.is_empty());

        for revision in [id("event-1"), id("drafts.event-1"), id("drafts.event-new")] {
            assert_eq!(count_refs(&store, &revision, "artist", &x), 1, "{}", revision);
        }
        assert!(store.document(&id("event-new")).is_none());

        let keys: Vec<_> = [id("event-1"), id("drafts.event-1")]
            .iter()
            .map(|r| store.document(r).unwrap().field("artist").unwrap()[0]["_key"].clone())
            .collect();
        assert_eq!(keys[0], keys[1]);
    }

    #[tokio::test]
    async fn add_repairs_only_the_revision_that_lacks_it() {
        let x = id("artist-x");
        let store = MemoryStore::with_documents(vec![
            Document::new(id("event-1"), "event").with_references("artist", &[&x]),
            Document::new(id("event-1").draft(), "event"),
        ]);

        let report = add_reciprocal(&store, &[id("event-1")], &x, "artist").await;
        assert_eq!(report.applied, vec![id("event-1")]);
        assert_eq!(count_refs(&store, &id("event-1"), "artist", &x), 1);
        assert_eq!(count_refs(&store, &id("drafts.event-1"), "artist", &x), 1);
    }

    #[tokio::test]
    async fn remove_strips_pending_draft_too() {
        let x = id("artist-x");
        let store = MemoryStore::with_documents(vec![
            Document::new(id("event-3"), "event").with_references("artist", &[&x]),
            Document::new(id("event-3").draft(), "event").with_references("artist", &[&x]),
        ]);

        let report = remove_reciprocal(&store, &[id("event-3")], &x, "artist").await;
        assert_eq!(report.applied, vec![id("event-3")]);
        assert_eq!(count_refs(&store, &id("event-3"), "artist", &x), 0);
        assert_eq!(count_refs(&store, &id("drafts.event-3"), "artist", &x), 0);
    }

    #[tokio::test]
    async fn remove_filters_every_matching_element() {
        let x = id("artist-x");
        let y = id("artist-y");
        let store = MemoryStore::with_documents(vec![
            Document::new(id("event-1"), "event").with_references("artist", &[&x, &y, &x]),
            Document::new(id("event-2"), "event").with_references("artist", &[&y]),
        ]);

        let report =
            remove_reciprocal(&store, &[id("event-1"), id("event-2")], &x, "artist").await;
        assert_eq!(report.applied, vec![id("event-1")]);
        assert_eq!(report.skipped, vec![id("event-2")]);
        assert_eq!(count_refs(&store, &id("event-1"), "artist", &x), 0);
        assert_eq!(count_refs(&store, &id("event-1"), "artist", &y), 1);
    }

    #[tokio::test]
    async fn remove_unsets_single_reference() {
        let date = id("date-1");
        let store = MemoryStore::with_documents(vec![Document::new(id("event-1"), "event")
            .with_field("date", json!({ "_type": "reference", "_ref": "date-1" }))]);

        let report = remove_reciprocal(&store, &[id("event-1")], &date, "date").await;
        assert_eq!(report.applied, vec![id("event-1")]);
        assert!(store.document(&id("event-1")).unwrap().field("date").is_none());
    }

    #[tokio::test]
    async fn listing_insertion_skips_present_id() {
        let listing = ListingPage {
            document_id: id("artistsPage"),
            field: "artists".into(),
        };
        let store = MemoryStore::with_documents(vec![Document::new(id("artistsPage"), "artistsPage")]);
        let x = id("artist-x");

        assert!(!listing_contains(&store, &listing, &x).await.unwrap());
        assert_eq!(add_to_listing(&store, &listing, &x).await.unwrap(), ListingOutcome::Added);
        assert_eq!(
            add_to_listing(&store, &listing, &x).await.unwrap(),
            ListingOutcome::AlreadyPresent
        );
        assert_eq!(count_refs(&store, &id("artistsPage"), "artists", &x), 1);
    }

    #[tokio::test]
    async fn listing_missing_page_is_not_found() {
        let listing = ListingPage {
            document_id: id("artistsPage"),
            field: "artists".into(),
        };
        let result = add_to_listing(&MemoryStore::new(), &listing, &id("artist-x")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
