//! workflow::publish
//!
//! Driver for the publish reconciliation workflow.
//!
//! # Design
//!
//! [`ReconciliationWorkflow::run`] performs each step's I/O and feeds the
//! result into [`transition`]. It is consumed by `run`, so one instance
//! drives exactly one publish. The state after every transition is
//! broadcast on a `tokio::sync::watch` channel; UIs read it through a
//! [`WorkflowHandle`].
//!
//! Failure handling follows three rules:
//! - Checks and the derived-field sync are diagnostic. Failures are logged,
//!   noted in the report, and the step yields nothing.
//! - Publish is authoritative. A failure ends the workflow with
//!   [`WorkflowError::Publish`] and no decision is offered.
//! - Repairs record per-target failures and the workflow moves on.
//!
//! The `on_complete` callback runs exactly once when the workflow ends,
//! whichever way it ends.
//!
//! # Example
//!
//! ```
//! use refsync::core::registry::Registry;
//! use refsync::core::types::{Document, DocumentId};
//! use refsync::store::memory::MemoryStore;
//! use refsync::ui::prompts::AutoConfirmer;
//! use refsync::workflow::{ReconciliationWorkflow, WorkflowOutcome};
//!
//! # tokio_test::block_on(async {
//! let id = DocumentId::new("artist-1").unwrap();
//! let store = MemoryStore::with_documents(vec![Document::new(id.draft(), "artist")]);
//!
//! let workflow = ReconciliationWorkflow::new(&Registry::festival(), "artist", &id).unwrap();
//! let report = workflow.run(&store, &AutoConfirmer { answer: false }).await.unwrap();
//! assert_eq!(report.outcome, WorkflowOutcome::Completed);
//! assert!(report.first_publish);
//! # });
//! ```

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::state::{
    transition, DecisionBranch, DecisionPolicy, Findings, PendingTarget, StepContext, StepEvent,
    TransitionError, WorkflowOutcome, WorkflowState,
};
use crate::core::registry::{EntityConfig, ListingPage, Registry, RelationshipPair};
use crate::core::types::DocumentId;
use crate::store::{DocumentStore, StoreError};
use crate::sync::{
    add_reciprocal, add_to_listing, find_missing_reciprocal, find_orphaned_reciprocal,
    listing_contains, remove_reciprocal, sync_derived_field, DiffError, DiffReport,
    ListingOutcome, PatchReport, SyncOutcome, TargetFailure,
};
use crate::ui::output::format_count;
use crate::ui::prompts::{Confirmation, Confirmer};

/// Errors that end a publish workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("no entity settings for document type '{0}'")]
    UnknownEntity(String),

    #[error("publish failed: {0}")]
    Publish(#[source] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// What happened at one decision point.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRecord {
    pub branch: DecisionBranch,
    pub accepted: bool,
    /// Documents that were patched.
    pub applied: Vec<DocumentId>,
    pub failures: Vec<TargetFailure>,
}

/// Summary of one workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowReport {
    /// Published id of the document.
    pub doc_id: DocumentId,
    pub missing: Vec<PendingTarget>,
    pub orphaned: Vec<PendingTarget>,
    /// Whether no published revision existed before this run.
    pub first_publish: bool,
    /// Derived-field outcome, when the entity has one.
    pub derived: Option<SyncOutcome>,
    /// Decisions in the order they were offered.
    pub decisions: Vec<DecisionRecord>,
    /// Diagnostic failures that were logged and skipped.
    pub diagnostics: Vec<String>,
    pub outcome: WorkflowOutcome,
}

impl WorkflowReport {
    fn new(doc_id: DocumentId) -> Self {
        Self {
            doc_id,
            missing: Vec::new(),
            orphaned: Vec::new(),
            first_publish: false,
            derived: None,
            decisions: Vec::new(),
            diagnostics: Vec::new(),
            outcome: WorkflowOutcome::Completed,
        }
    }

    /// The record for a decision branch, if it was offered.
    pub fn decision(&self, branch: DecisionBranch) -> Option<&DecisionRecord> {
        self.decisions.iter().find(|d| d.branch == branch)
    }

    /// Whether every offered repair succeeded for every target.
    pub fn is_clean(&self) -> bool {
        self.outcome == WorkflowOutcome::Completed
            && self.decisions.iter().all(|d| d.failures.is_empty())
    }
}

/// Read-only view of a running workflow's state.
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    rx: watch::Receiver<WorkflowState>,
}

impl WorkflowHandle {
    /// The current state.
    pub fn state(&self) -> WorkflowState {
        self.rx.borrow().clone()
    }

    /// Wait for the next state change.
    ///
    /// Returns `false` once the workflow has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

type CompletionCallback = Box<dyn FnOnce(&WorkflowReport) + Send>;

/// One publish of one document, with reconciliation around it.
pub struct ReconciliationWorkflow {
    registry: Registry,
    entity: EntityConfig,
    doc_id: DocumentId,
    policy: DecisionPolicy,
    state_tx: watch::Sender<WorkflowState>,
    on_complete: Option<CompletionCallback>,
}

impl std::fmt::Debug for ReconciliationWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationWorkflow")
            .field("doc_type", &self.entity.doc_type)
            .field("doc_id", &self.doc_id)
            .field("policy", &self.policy)
            .field("state", &*self.state_tx.borrow())
            .finish()
    }
}

impl ReconciliationWorkflow {
    /// Prepare a workflow for `doc_id` of type `doc_type`.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::UnknownEntity` if the registry has no settings
    /// for `doc_type`.
    pub fn new(
        registry: &Registry,
        doc_type: &str,
        doc_id: &DocumentId,
    ) -> Result<Self, WorkflowError> {
        let entity = registry
            .entity(doc_type)
            .cloned()
            .ok_or_else(|| WorkflowError::UnknownEntity(doc_type.to_string()))?;
        let (state_tx, _) = watch::channel(WorkflowState::Idle);
        Ok(Self {
            registry: registry.clone(),
            entity,
            doc_id: doc_id.published(),
            policy: DecisionPolicy::default(),
            state_tx,
            on_complete: None,
        })
    }

    /// Use a decision order other than the default.
    pub fn with_policy(mut self, policy: DecisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register a callback to run once when the workflow ends.
    pub fn on_complete(mut self, callback: impl FnOnce(&WorkflowReport) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> WorkflowHandle {
        WorkflowHandle {
            rx: self.state_tx.subscribe(),
        }
    }

    /// Current state.
    pub fn state(&self) -> WorkflowState {
        self.state_tx.borrow().clone()
    }

    /// Run the workflow to completion.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::Publish` if the publish itself fails.
    pub async fn run(
        mut self,
        store: &dyn DocumentStore,
        confirmer: &dyn Confirmer,
    ) -> Result<WorkflowReport, WorkflowError> {
        info!(doc_id = %self.doc_id, doc_type = %self.entity.doc_type, "starting publish workflow");
        let mut report = WorkflowReport::new(self.doc_id.clone());

        let result = self.drive(store, confirmer, &mut report).await;
        if let Err(e) = &result {
            report.outcome = WorkflowOutcome::Aborted {
                error: e.to_string(),
            };
            if !self.state().is_done() {
                self.state_tx
                    .send_replace(WorkflowState::Done(report.outcome.clone()));
            }
        }

        if let Some(callback) = self.on_complete.take() {
            callback(&report);
        }
        result.map(|()| report)
    }

    async fn drive(
        &self,
        store: &dyn DocumentStore,
        confirmer: &dyn Confirmer,
        report: &mut WorkflowReport,
    ) -> Result<(), WorkflowError> {
        let mut findings = Findings::default();
        let mut state = WorkflowState::Idle;

        loop {
            let event = match &state {
                WorkflowState::Idle => StepEvent::Started,
                WorkflowState::CheckingMissing => {
                    findings.missing = self.check_missing(store, report).await;
                    report.missing = findings.missing.clone();
                    StepEvent::MissingChecked
                }
                WorkflowState::SyncingDerived => {
                    if let Some(derived) = &self.entity.derived {
                        report.derived = Some(sync_derived_field(store, &self.doc_id, derived).await);
                    }
                    StepEvent::DerivedSynced
                }
                WorkflowState::Publishing => {
                    report.first_publish = self.is_first_publish(store, report).await;
                    match store.publish(&self.doc_id).await {
                        Ok(()) => {
                            info!(doc_id = %self.doc_id, "published");
                            StepEvent::Published
                        }
                        Err(e) => {
                            warn!(doc_id = %self.doc_id, error = %e, "publish failed");
                            self.advance(&state, StepEvent::PublishFailed(e.to_string()), &findings)?;
                            return Err(WorkflowError::Publish(e));
                        }
                    }
                }
                WorkflowState::CheckingOrphaned => {
                    findings.orphaned = self.check_orphaned(store, report).await;
                    report.orphaned = findings.orphaned.clone();
                    findings.listing = self.listing_offer(store, report).await;
                    StepEvent::OrphansChecked
                }
                WorkflowState::AwaitingAdditionDecision { targets } => {
                    let record = self.decide_additions(store, confirmer, targets).await;
                    report.decisions.push(record);
                    StepEvent::Decided
                }
                WorkflowState::AwaitingRemovalDecision { targets } => {
                    let record = self.decide_removals(store, confirmer, targets).await;
                    report.decisions.push(record);
                    StepEvent::Decided
                }
                WorkflowState::AwaitingListingDecision { listing } => {
                    let record = self.decide_listing(store, confirmer, listing).await;
                    report.decisions.push(record);
                    StepEvent::Decided
                }
                WorkflowState::Done(outcome) => {
                    report.outcome = outcome.clone();
                    info!(doc_id = %self.doc_id, decisions = report.decisions.len(), "publish workflow done");
                    return Ok(());
                }
            };
            state = self.advance(&state, event, &findings)?;
        }
    }

    fn advance(
        &self,
        state: &WorkflowState,
        event: StepEvent,
        findings: &Findings,
    ) -> Result<WorkflowState, TransitionError> {
        let ctx = StepContext {
            findings,
            policy: &self.policy,
            has_derived: self.entity.derived.is_some(),
        };
        let next = transition(state, event, &ctx)?;
        debug!(doc_id = %self.doc_id, from = state.name(), to = next.name(), "workflow transition");
        self.state_tx.send_replace(next.clone());
        Ok(next)
    }

    fn pending(&self, pair: &RelationshipPair, diff: DiffReport) -> Vec<PendingTarget> {
        let title_field = self.registry.title_field(&pair.target_type);
        diff.targets
            .into_iter()
            .map(|doc| PendingTarget {
                pair: pair.clone(),
                label: doc.label(title_field),
                id: doc.id.published(),
            })
            .collect()
    }

    fn note_diff(&self, report: &mut WorkflowReport, pair: &RelationshipPair, diff: &DiffReport) {
        for failure in &diff.failures {
            report
                .diagnostics
                .push(format!("{}: could not read {}", pair, failure));
        }
    }

    fn note_diff_error(&self, report: &mut WorkflowReport, pair: &RelationshipPair, e: DiffError) {
        warn!(doc_id = %self.doc_id, pair = %pair, error = %e, "reference check failed; continuing");
        report.diagnostics.push(format!("{}: {}", pair, e));
    }

    async fn check_missing(
        &self,
        store: &dyn DocumentStore,
        report: &mut WorkflowReport,
    ) -> Vec<PendingTarget> {
        let mut pending = Vec::new();
        for pair in self.registry.pairs_from(&self.entity.doc_type) {
            match find_missing_reciprocal(store, &self.doc_id, pair).await {
                Ok(diff) => {
                    self.note_diff(report, pair, &diff);
                    pending.extend(self.pending(pair, diff));
                }
                Err(e) => self.note_diff_error(report, pair, e),
            }
        }
        pending
    }

    async fn check_orphaned(
        &self,
        store: &dyn DocumentStore,
        report: &mut WorkflowReport,
    ) -> Vec<PendingTarget> {
        let mut pending = Vec::new();
        for pair in self.registry.pairs_from(&self.entity.doc_type) {
            match find_orphaned_reciprocal(store, &self.doc_id, pair).await {
                Ok(diff) => {
                    self.note_diff(report, pair, &diff);
                    pending.extend(self.pending(pair, diff));
                }
                Err(e) => self.note_diff_error(report, pair, e),
            }
        }
        pending
    }

    /// Whether the document has never been published.
    ///
    /// A failed read counts as "published before", which only suppresses the
    /// listing offer.
    async fn is_first_publish(&self, store: &dyn DocumentStore, report: &mut WorkflowReport) -> bool {
        match store.get(&self.doc_id).await {
            Ok(existing) => existing.is_none(),
            Err(e) => {
                warn!(doc_id = %self.doc_id, error = %e, "could not read published revision");
                report
                    .diagnostics
                    .push(format!("could not read published revision: {}", e));
                false
            }
        }
    }

    /// The listing page to offer, if this is a first publish and the page
    /// does not list the document yet.
    async fn listing_offer(
        &self,
        store: &dyn DocumentStore,
        report: &mut WorkflowReport,
    ) -> Option<ListingPage> {
        let listing = self.entity.listing.as_ref()?;
        if !report.first_publish {
            return None;
        }
        match listing_contains(store, listing, &self.doc_id).await {
            Ok(false) => Some(listing.clone()),
            Ok(true) => {
                debug!(doc_id = %self.doc_id, listing = %listing.document_id, "already on listing page");
                None
            }
            Err(e) => {
                warn!(doc_id = %self.doc_id, listing = %listing.document_id, error = %e, "could not read listing page");
                report
                    .diagnostics
                    .push(format!("listing page '{}': {}", listing.document_id, e));
                None
            }
        }
    }

    async fn ask(&self, confirmer: &dyn Confirmer, confirmation: Confirmation) -> bool {
        match confirmer.confirm(&confirmation).await {
            Ok(answer) => answer,
            Err(e) => {
                debug!(doc_id = %self.doc_id, error = %e, "prompt not answered; treating as decline");
                false
            }
        }
    }

    async fn decide_additions(
        &self,
        store: &dyn DocumentStore,
        confirmer: &dyn Confirmer,
        targets: &[PendingTarget],
    ) -> DecisionRecord {
        let confirmation = Confirmation::new(
            "Add missing references?",
            format!(
                "{} referenced by this {} do not reference it back.",
                format_count(targets.len(), "document"),
                self.entity.label.to_lowercase()
            ),
        )
        .with_items(labels(targets))
        .with_labels("Add references", "Skip");

        let accepted = self.ask(confirmer, confirmation).await;
        let mut record = DecisionRecord {
            branch: DecisionBranch::Additions,
            accepted,
            applied: Vec::new(),
            failures: Vec::new(),
        };
        if accepted {
            for (pair, ids) in group_by_pair(targets) {
                let patched = add_reciprocal(store, &ids, &self.doc_id, &pair.target_field).await;
                absorb(&mut record, patched);
            }
        }
        record
    }

    async fn decide_removals(
        &self,
        store: &dyn DocumentStore,
        confirmer: &dyn Confirmer,
        targets: &[PendingTarget],
    ) -> DecisionRecord {
        let confirmation = Confirmation::new(
            "Remove stale references?",
            format!(
                "{} still reference this {} but are no longer listed on it.",
                format_count(targets.len(), "document"),
                self.entity.label.to_lowercase()
            ),
        )
        .with_items(labels(targets))
        .with_labels("Remove references", "Keep");

        let accepted = self.ask(confirmer, confirmation).await;
        let mut record = DecisionRecord {
            branch: DecisionBranch::Removals,
            accepted,
            applied: Vec::new(),
            failures: Vec::new(),
        };
        if accepted {
            for (pair, ids) in group_by_pair(targets) {
                let patched = remove_reciprocal(store, &ids, &self.doc_id, &pair.target_field).await;
                absorb(&mut record, patched);
            }
        }
        record
    }

    async fn decide_listing(
        &self,
        store: &dyn DocumentStore,
        confirmer: &dyn Confirmer,
        listing: &ListingPage,
    ) -> DecisionRecord {
        let confirmation = Confirmation::new(
            "Add to listing page?",
            format!(
                "This {} was published for the first time. Add it to '{}'?",
                self.entity.label.to_lowercase(),
                listing.document_id
            ),
        )
        .with_items(vec![self.doc_id.to_string()])
        .with_labels("Add to listing", "Skip");

        let accepted = self.ask(confirmer, confirmation).await;
        let mut record = DecisionRecord {
            branch: DecisionBranch::Listing,
            accepted,
            applied: Vec::new(),
            failures: Vec::new(),
        };
        if accepted {
            match add_to_listing(store, listing, &self.doc_id).await {
                Ok(ListingOutcome::Added) => record.applied.push(listing.document_id.clone()),
                Ok(ListingOutcome::AlreadyPresent) => {
                    debug!(doc_id = %self.doc_id, "listing page gained the document meanwhile");
                }
                Err(e) => {
                    warn!(listing = %listing.document_id, error = %e, "listing insertion failed");
                    record.failures.push(TargetFailure {
                        id: listing.document_id.clone(),
                        error: e,
                    });
                }
            }
        }
        record
    }
}

fn labels(targets: &[PendingTarget]) -> Vec<String> {
    targets.iter().map(|t| t.label.clone()).collect()
}

/// Target ids grouped by relationship, in first-seen order.
fn group_by_pair(targets: &[PendingTarget]) -> Vec<(&RelationshipPair, Vec<DocumentId>)> {
    let mut groups: Vec<(&RelationshipPair, Vec<DocumentId>)> = Vec::new();
    for target in targets {
        match groups.iter_mut().find(|(pair, _)| *pair == &target.pair) {
            Some((_, ids)) => ids.push(target.id.clone()),
            None => groups.push((&target.pair, vec![target.id.clone()])),
        }
    }
    groups
}

fn absorb(record: &mut DecisionRecord, patched: PatchReport) {
    record.applied.extend(patched.applied);
    record.failures.extend(patched.failures);
}
