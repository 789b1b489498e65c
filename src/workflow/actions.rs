//! workflow::actions
//!
//! Action factories for a hosting UI.
//!
//! A host registers one publish and one delete action per document. Each
//! action describes itself (label, enabled flag, reason when disabled) and
//! runs its workflow when triggered.
//!
//! # Example
//!
//! ```
//! use refsync::core::registry::Registry;
//! use refsync::core::types::{Document, DocumentId};
//! use refsync::store::memory::MemoryStore;
//! use refsync::workflow::ActionFactory;
//!
//! # tokio_test::block_on(async {
//! let id = DocumentId::new("artist-1").unwrap();
//! let store = MemoryStore::with_documents(vec![Document::new(id.clone(), "artist")]);
//!
//! let factory = ActionFactory::new(Registry::festival());
//! let publish = factory.publish("artist", &id).unwrap().describe(&store).await.unwrap();
//! assert!(publish.disabled);
//! let delete = factory.delete("artist", &id).unwrap().describe(&store).await.unwrap();
//! assert!(!delete.disabled);
//! # });
//! ```

use thiserror::Error;

use super::delete::{CascadingDeleteGuard, DeleteError, DeleteOutcome};
use super::publish::{ReconciliationWorkflow, WorkflowError, WorkflowReport};
use super::state::DecisionPolicy;
use crate::core::registry::Registry;
use crate::core::types::DocumentId;
use crate::store::{DocumentStore, StoreError};
use crate::ui::prompts::Confirmer;

/// Reason shown when there is no draft to publish.
pub const NO_CHANGES: &str = "No unpublished changes";

/// Reason shown when neither revision exists.
pub const NOTHING_TO_DELETE: &str = "Document does not exist";

/// Errors from actions.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("no entity settings for document type '{0}'")]
    UnknownEntity(String),

    #[error("{kind} is disabled: {reason}")]
    Disabled { kind: ActionKind, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Delete(#[from] DeleteError),
}

/// Which action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Publish,
    Delete,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Publish => write!(f, "publish"),
            ActionKind::Delete => write!(f, "delete"),
        }
    }
}

/// How an action presents itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    pub kind: ActionKind,
    pub label: String,
    pub disabled: bool,
    pub reason: Option<String>,
}

impl ActionDescriptor {
    fn enabled(kind: ActionKind, label: &str) -> Self {
        Self {
            kind,
            label: label.to_string(),
            disabled: false,
            reason: None,
        }
    }

    fn disabled(kind: ActionKind, label: &str, reason: &str) -> Self {
        Self {
            kind,
            label: label.to_string(),
            disabled: true,
            reason: Some(reason.to_string()),
        }
    }

    fn ensure_enabled(&self) -> Result<(), ActionError> {
        match (&self.reason, self.disabled) {
            (Some(reason), true) => Err(ActionError::Disabled {
                kind: self.kind,
                reason: reason.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Builds publish and delete actions from the registry.
#[derive(Debug, Clone)]
pub struct ActionFactory {
    registry: Registry,
    policy: DecisionPolicy,
}

impl ActionFactory {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            policy: DecisionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DecisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Document types that actions can be built for.
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.registry.entities.iter().map(|e| e.doc_type.as_str())
    }

    /// # Errors
    ///
    /// Returns `ActionError::UnknownEntity` for an undeclared type.
    pub fn publish(&self, doc_type: &str, doc_id: &DocumentId) -> Result<PublishAction, ActionError> {
        self.ensure_entity(doc_type)?;
        Ok(PublishAction {
            registry: self.registry.clone(),
            policy: self.policy.clone(),
            doc_type: doc_type.to_string(),
            doc_id: doc_id.published(),
        })
    }

    /// # Errors
    ///
    /// Returns `ActionError::UnknownEntity` for an undeclared type.
    pub fn delete(&self, doc_type: &str, doc_id: &DocumentId) -> Result<DeleteAction, ActionError> {
        let guard = CascadingDeleteGuard::new(&self.registry, doc_type, doc_id)
            .map_err(|_| ActionError::UnknownEntity(doc_type.to_string()))?;
        Ok(DeleteAction {
            guard,
            doc_id: doc_id.published(),
        })
    }

    fn ensure_entity(&self, doc_type: &str) -> Result<(), ActionError> {
        match self.registry.entity(doc_type) {
            Some(_) => Ok(()),
            None => Err(ActionError::UnknownEntity(doc_type.to_string())),
        }
    }
}

/// Publish with reconciliation.
#[derive(Debug, Clone)]
pub struct PublishAction {
    registry: Registry,
    policy: DecisionPolicy,
    doc_type: String,
    doc_id: DocumentId,
}

impl PublishAction {
    /// Disabled when there is no draft.
    pub async fn describe(&self, store: &dyn DocumentStore) -> Result<ActionDescriptor, StoreError> {
        let descriptor = match store.get(&self.doc_id.draft()).await? {
            Some(_) => ActionDescriptor::enabled(ActionKind::Publish, "Publish"),
            None => ActionDescriptor::disabled(ActionKind::Publish, "Publish", NO_CHANGES),
        };
        Ok(descriptor)
    }

    /// The workflow this action runs, for callers that want to observe it.
    pub fn workflow(&self) -> Result<ReconciliationWorkflow, ActionError> {
        Ok(
            ReconciliationWorkflow::new(&self.registry, &self.doc_type, &self.doc_id)?
                .with_policy(self.policy.clone()),
        )
    }

    /// Run the publish workflow.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::Disabled` when there is nothing to publish and
    /// `ActionError::Workflow` when the publish fails.
    pub async fn handle(
        &self,
        store: &dyn DocumentStore,
        confirmer: &dyn Confirmer,
    ) -> Result<WorkflowReport, ActionError> {
        self.describe(store).await?.ensure_enabled()?;
        Ok(self.workflow()?.run(store, confirmer).await?)
    }
}

/// Delete with reference cleanup.
#[derive(Debug, Clone)]
pub struct DeleteAction {
    guard: CascadingDeleteGuard,
    doc_id: DocumentId,
}

impl DeleteAction {
    /// Disabled when neither revision exists.
    pub async fn describe(&self, store: &dyn DocumentStore) -> Result<ActionDescriptor, StoreError> {
        let descriptor = match store.get_editing(&self.doc_id).await? {
            Some(_) => ActionDescriptor::enabled(ActionKind::Delete, "Delete"),
            None => ActionDescriptor::disabled(ActionKind::Delete, "Delete", NOTHING_TO_DELETE),
        };
        Ok(descriptor)
    }

    /// Run the delete guard.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::Disabled` when the document does not exist and
    /// `ActionError::Delete` when a revision cannot be deleted.
    pub async fn handle(
        &self,
        store: &dyn DocumentStore,
        confirmer: &dyn Confirmer,
    ) -> Result<DeleteOutcome, ActionError> {
        self.describe(store).await?.ensure_enabled()?;
        Ok(self.guard.run(store, confirmer).await?)
    }
}

/// The `_type` of a document, read from the draft-preferred revision.
pub async fn document_type(
    store: &dyn DocumentStore,
    doc_id: &DocumentId,
) -> Result<Option<String>, StoreError> {
    Ok(store.get_editing(doc_id).await?.map(|doc| doc.doc_type))
}
