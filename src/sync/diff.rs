//! sync::diff
//!
//! Reference diff engine.
//!
//! # Algorithms
//!
//! Both checks are reads. They never patch anything.
//!
//! - [`find_missing_reciprocal`] runs before publish. It reads the revision
//!   being edited (draft first) so references added just before publishing
//!   are seen, resolves the forward field to target ids, and keeps the
//!   targets whose reciprocal field does not point back at the source's
//!   published id. Targets are read draft first too, so a target that has
//!   never been published is still checked.
//! - [`find_orphaned_reciprocal`] runs after publish. It queries every
//!   revision of every target that points back at the source and subtracts
//!   the ids the published source still lists.
//!
//! A failure to read one target is logged and that target left out of the
//! result. A failure to read the source is returned as a [`DiffError`].
//!
//! # Example
//!
//! ```
//! use refsync::core::registry::RelationshipPair;
//! use refsync::core::types::{Document, DocumentId};
//! use refsync::store::memory::MemoryStore;
//! use refsync::sync::find_missing_reciprocal;
//!
//! # tokio_test::block_on(async {
//! let artist = DocumentId::new("artist-x").unwrap();
//! let e1 = DocumentId::new("event-1").unwrap();
//! let e2 = DocumentId::new("event-2").unwrap();
//! let store = MemoryStore::with_documents(vec![
//!     Document::new(artist.clone(), "artist").with_references("events", &[&e1, &e2]),
//!     Document::new(e1.clone(), "event").with_references("artist", &[&artist]),
//!     Document::new(e2.clone(), "event"),
//! ]);
//!
//! let pair = RelationshipPair::new("artist", "events", "event", "artist");
//! let report = find_missing_reciprocal(&store, &artist, &pair).await.unwrap();
//! assert_eq!(report.ids(), vec![e2]);
//! # });
//! ```

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::core::registry::RelationshipPair;
use crate::core::types::{Document, DocumentId};
use crate::store::{DocumentStore, Filter, RevisionScope, StoreError};

/// Errors that stop a diff from producing any result.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("source document '{0}' not found")]
    SourceMissing(DocumentId),

    #[error("failed to read source document '{id}': {source}")]
    Source { id: DocumentId, source: StoreError },

    #[error("failed to query {doc_type}.{field} referencing '{id}': {source}")]
    Query {
        doc_type: String,
        field: String,
        id: DocumentId,
        source: StoreError,
    },
}

/// A store failure for one target document.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetFailure {
    pub id: DocumentId,
    pub error: StoreError,
}

impl fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.error)
    }
}

/// Result of one diff: the affected targets plus targets that could not be read.
#[derive(Debug, Clone, Default)]
pub struct DiffReport {
    /// Affected target documents (draft revision when one exists), in
    /// result order, one per target.
    pub targets: Vec<Document>,
    /// Targets excluded because they could not be read.
    pub failures: Vec<TargetFailure>,
}

impl DiffReport {
    /// Published ids of the affected targets.
    pub fn ids(&self) -> Vec<DocumentId> {
        self.targets.iter().map(|d| d.id.published()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Find targets of `pair.source_field` that do not reference the source back.
///
/// # Errors
///
/// Returns `DiffError` if the source document cannot be read.
pub async fn find_missing_reciprocal(
    store: &dyn DocumentStore,
    source_id: &DocumentId,
    pair: &RelationshipPair,
) -> Result<DiffReport, DiffError> {
    let published = source_id.published();
    let source = store
        .get_editing(&published)
        .await
        .map_err(|e| DiffError::Source {
            id: published.clone(),
            source: e,
        })?
        .ok_or_else(|| DiffError::SourceMissing(published.clone()))?;

    let mut report = DiffReport::default();
    for target_id in source.reference_ids(&pair.source_field) {
        match store.get_editing(&target_id).await {
            Ok(Some(target)) if target.doc_type != pair.target_type => {
                debug!(
                    target = %target_id,
                    doc_type = %target.doc_type,
                    "skipping target of unrelated type"
                );
            }
            Ok(Some(target)) => {
                if !target.references(&pair.target_field, &published) {
                    report.targets.push(target);
                }
            }
            Ok(None) => {
                warn!(source = %published, target = %target_id, "referenced document not found");
                report.failures.push(TargetFailure {
                    error: StoreError::NotFound(target_id.to_string()),
                    id: target_id,
                });
            }
            Err(e) => {
                warn!(source = %published, target = %target_id, error = %e, "failed to read target");
                report.failures.push(TargetFailure {
                    id: target_id,
                    error: e,
                });
            }
        }
    }

    debug!(
        source = %published,
        pair = %pair,
        missing = report.targets.len(),
        "missing reciprocal check complete"
    );
    Ok(report)
}

/// Find targets that reference the published source without being listed by it.
///
/// # Errors
///
/// Returns `DiffError` if the published source cannot be read or the
/// back-reference query fails.
pub async fn find_orphaned_reciprocal(
    store: &dyn DocumentStore,
    source_id: &DocumentId,
    pair: &RelationshipPair,
) -> Result<DiffReport, DiffError> {
    let published = source_id.published();
    let source = store
        .get(&published)
        .await
        .map_err(|e| DiffError::Source {
            id: published.clone(),
            source: e,
        })?
        .ok_or_else(|| DiffError::SourceMissing(published.clone()))?;

    let listed = source.reference_ids(&pair.source_field);
    let filter = Filter::of_type(pair.target_type.as_str())
        .referencing(pair.target_field.as_str(), &published)
        .revisions(RevisionScope::All);
    let referrers = store.fetch(&filter).await.map_err(|e| DiffError::Query {
        doc_type: pair.target_type.clone(),
        field: pair.target_field.clone(),
        id: published.clone(),
        source: e,
    })?;

    let mut report = DiffReport::default();
    for doc in referrers {
        let target_id = doc.id.published();
        if listed.contains(&target_id)
            || report.targets.iter().any(|t| t.id.published() == target_id)
        {
            continue;
        }
        report.targets.push(doc);
    }

    debug!(
        source = %published,
        pair = %pair,
        orphaned = report.targets.len(),
        "orphaned reciprocal check complete"
    );
    Ok(report)
}
