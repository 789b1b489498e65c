//! workflow::delete
//!
//! Cascading delete guard.
//!
//! # Design
//!
//! Deleting a document leaves a dangling reference on every document that
//! pointed at it, and the store does not prevent that. The guard:
//!
//! 1. [`prepare_delete`] counts the referrers of each configured
//!    `(type, field)` so the editor sees what will change.
//! 2. After confirmation, [`confirm_delete`] re-queries the referrers,
//!    strips every reference to the document from drafts and published
//!    revisions alike, then deletes the draft and the published revision.
//!
//! Stripping runs first. If the final delete fails, referrers have lost a
//! reference to a document that still exists, which an editor can see and
//! fix; the reverse order would leave ids pointing nowhere.
//!
//! A failure to strip one referrer is recorded and the rest carry on. A
//! failure to delete a revision is returned. Deleting a revision that does
//! not exist is success.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::registry::{Registry, ReferrerConfig};
use crate::core::types::DocumentId;
use crate::store::{without_reference, DocumentStore, Filter, RevisionScope, StoreError};
use crate::sync::patch::strip_patch;
use crate::sync::TargetFailure;
use crate::ui::output::format_count;
use crate::ui::prompts::{Confirmation, Confirmer};

/// Errors from the delete guard.
#[derive(Debug, Error)]
pub enum DeleteError {
    #[error("no entity settings for document type '{0}'")]
    UnknownEntity(String),

    #[error("failed to find {doc_type}.{field} referencing the document: {source}")]
    Query {
        doc_type: String,
        field: String,
        source: StoreError,
    },

    #[error("failed to delete '{id}': {source}")]
    Delete { id: DocumentId, source: StoreError },
}

/// Documents referencing the target through one `(type, field)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferrerGroup {
    pub referrer: ReferrerConfig,
    /// Published ids of the referring documents.
    pub documents: Vec<DocumentId>,
    /// Display labels, parallel to `documents`.
    pub labels: Vec<String>,
}

impl ReferrerGroup {
    pub fn count(&self) -> usize {
        self.documents.len()
    }
}

/// What a delete would touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    /// Published id of the document to delete.
    pub doc_id: DocumentId,
    pub groups: Vec<ReferrerGroup>,
}

impl DeleteReport {
    /// Whether nothing references the document.
    pub fn is_unreferenced(&self) -> bool {
        self.groups.iter().all(|g| g.documents.is_empty())
    }

    /// Total referring documents across all groups.
    pub fn total(&self) -> usize {
        self.groups.iter().map(ReferrerGroup::count).sum()
    }
}

/// What a completed delete did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteSummary {
    /// Referrer revisions that had the reference stripped.
    pub stripped: Vec<DocumentId>,
    /// Referrer revisions that could not be stripped.
    pub failures: Vec<TargetFailure>,
    /// Referrer queries that failed and were skipped.
    pub diagnostics: Vec<String>,
    /// Revisions removed (only those that existed).
    pub deleted: Vec<DocumentId>,
}

/// Result of running the guard.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The editor declined; nothing was changed.
    Cancelled,
    Deleted(DeleteSummary),
}

fn referrer_filter(referrer: &ReferrerConfig, doc_id: &DocumentId) -> Filter {
    Filter::of_type(referrer.referring_type.as_str())
        .referencing(referrer.field.as_str(), doc_id)
        .revisions(RevisionScope::All)
}

/// Count the documents referencing `doc_id` through each referrer.
///
/// Drafts and published revisions of one referrer count once. Labels
/// prefer the draft, which is what an editor sees.
///
/// # Errors
///
/// Returns `DeleteError::Query` if any referrer query fails.
pub async fn prepare_delete(
    store: &dyn DocumentStore,
    doc_id: &DocumentId,
    referrers: &[ReferrerConfig],
    registry: &Registry,
) -> Result<DeleteReport, DeleteError> {
    let published = doc_id.published();
    let mut groups = Vec::with_capacity(referrers.len());

    for referrer in referrers {
        let docs = store
            .fetch(&referrer_filter(referrer, &published))
            .await
            .map_err(|e| DeleteError::Query {
                doc_type: referrer.referring_type.clone(),
                field: referrer.field.clone(),
                source: e,
            })?;

        let title_field = registry.title_field(&referrer.referring_type);
        let mut group = ReferrerGroup {
            referrer: referrer.clone(),
            documents: Vec::new(),
            labels: Vec::new(),
        };
        for doc in docs {
            let id = doc.id.published();
            let label = doc.label(title_field);
            match group.documents.iter().position(|d| *d == id) {
                Some(i) if doc.id.is_draft() => group.labels[i] = label,
                Some(_) => {}
                None => {
                    group.documents.push(id);
                    group.labels.push(label);
                }
            }
        }
        debug!(
            doc_id = %published,
            referrer = %referrer.referring_type,
            field = %referrer.field,
            count = group.count(),
            "counted referrers"
        );
        groups.push(group);
    }

    Ok(DeleteReport {
        doc_id: published,
        groups,
    })
}

/// Strip every reference to `doc_id`, then delete both of its revisions.
///
/// # Errors
///
/// Returns `DeleteError::Delete` if removing either revision fails.
pub async fn confirm_delete(
    store: &dyn DocumentStore,
    doc_id: &DocumentId,
    referrers: &[ReferrerConfig],
) -> Result<DeleteSummary, DeleteError> {
    let published = doc_id.published();
    let mut summary = DeleteSummary::default();

    for referrer in referrers {
        let docs = match store.fetch(&referrer_filter(referrer, &published)).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(
                    doc_id = %published,
                    referrer = %referrer.referring_type,
                    field = %referrer.field,
                    error = %e,
                    "referrer query failed; skipping"
                );
                summary.diagnostics.push(format!(
                    "{}.{}: {}",
                    referrer.referring_type, referrer.field, e
                ));
                continue;
            }
        };

        for doc in docs {
            let Some(replacement) = doc
                .field(&referrer.field)
                .and_then(|value| without_reference(value, &published))
            else {
                continue;
            };
            match store.patch(strip_patch(&doc.id, &referrer.field, replacement)).await {
                Ok(()) => summary.stripped.push(doc.id),
                Err(e) => {
                    warn!(referrer = %doc.id, error = %e, "failed to strip reference");
                    summary.failures.push(TargetFailure { id: doc.id, error: e });
                }
            }
        }
    }

    for revision in [published.draft(), published.clone()] {
        let existed = match store.get(&revision).await {
            Ok(doc) => doc.is_some(),
            Err(e) => {
                warn!(revision = %revision, error = %e, "could not read revision before delete");
                summary
                    .diagnostics
                    .push(format!("could not read {revision}: {e}"));
                false
            }
        };
        match store.delete(&revision).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {
                if existed {
                    summary.deleted.push(revision);
                }
            }
            Err(e) => {
                return Err(DeleteError::Delete {
                    id: revision,
                    source: e,
                })
            }
        }
    }

    info!(
        doc_id = %published,
        stripped = summary.stripped.len(),
        failures = summary.failures.len(),
        "document deleted"
    );
    Ok(summary)
}

/// Prepare, confirm and delete one document.
#[derive(Debug, Clone)]
pub struct CascadingDeleteGuard {
    registry: Registry,
    label: String,
    doc_id: DocumentId,
    referrers: Vec<ReferrerConfig>,
}

impl CascadingDeleteGuard {
    /// # Errors
    ///
    /// Returns `DeleteError::UnknownEntity` if the registry has no settings
    /// for `doc_type`.
    pub fn new(registry: &Registry, doc_type: &str, doc_id: &DocumentId) -> Result<Self, DeleteError> {
        let entity = registry
            .entity(doc_type)
            .ok_or_else(|| DeleteError::UnknownEntity(doc_type.to_string()))?;
        Ok(Self {
            registry: registry.clone(),
            label: entity.label.clone(),
            doc_id: doc_id.published(),
            referrers: entity.referrers.clone(),
        })
    }

    pub async fn prepare(&self, store: &dyn DocumentStore) -> Result<DeleteReport, DeleteError> {
        prepare_delete(store, &self.doc_id, &self.referrers, &self.registry).await
    }

    /// The question shown for a prepared delete.
    pub fn confirmation(&self, report: &DeleteReport) -> Confirmation {
        let noun = self.label.to_lowercase();
        if report.is_unreferenced() {
            return Confirmation::new(
                format!("Delete {}?", noun),
                format!("'{}' and its draft will be permanently deleted.", self.doc_id),
            )
            .with_labels("Delete", "Cancel");
        }

        let items = report
            .groups
            .iter()
            .flat_map(|group| {
                group.labels.iter().map(move |label| {
                    format!(
                        "{} ({}.{})",
                        label, group.referrer.referring_type, group.referrer.field
                    )
                })
            })
            .collect();
        Confirmation::new(
            format!("Delete {} and remove its references?", noun),
            format!(
                "{} reference '{}'. The references are removed before it is deleted.",
                format_count(report.total(), "document"),
                self.doc_id
            ),
        )
        .with_items(items)
        .with_labels("Delete", "Cancel")
    }

    /// Ask, then delete on acceptance.
    ///
    /// A closed or failed prompt cancels.
    pub async fn run(
        &self,
        store: &dyn DocumentStore,
        confirmer: &dyn Confirmer,
    ) -> Result<DeleteOutcome, DeleteError> {
        let report = self.prepare(store).await?;
        let accepted = match confirmer.confirm(&self.confirmation(&report)).await {
            Ok(answer) => answer,
            Err(e) => {
                debug!(doc_id = %self.doc_id, error = %e, "prompt not answered; cancelling");
                false
            }
        };
        if !accepted {
            info!(doc_id = %self.doc_id, "delete cancelled");
            return Ok(DeleteOutcome::Cancelled);
        }

        confirm_delete(store, &self.doc_id, &self.referrers)
            .await
            .map(DeleteOutcome::Deleted)
    }
}
