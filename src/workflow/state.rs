//! workflow::state
//!
//! States and pure transitions of the publish reconciliation workflow.
//!
//! # Design
//!
//! The workflow is an explicit state enum with a small payload per state.
//! [`transition`] is a pure function of the current state, the step that
//! just finished, and what the checks found; the driver in
//! [`super::publish`] performs the I/O and feeds events in.
//!
//! ```text
//! Idle -> CheckingMissing -> [SyncingDerived] -> Publishing -> CheckingOrphaned
//!      -> AwaitingAdditionDecision? -> AwaitingRemovalDecision? -> AwaitingListingDecision?
//!      -> Done
//! ```
//!
//! Decision states are visited in [`DecisionPolicy`] order and skipped when
//! there is nothing to decide. A publish failure goes straight to `Done`.
//!
//! # Example
//!
//! ```
//! use refsync::workflow::{transition, DecisionPolicy, Findings, StepContext, StepEvent, WorkflowState};
//!
//! let findings = Findings::default();
//! let policy = DecisionPolicy::default();
//! let ctx = StepContext { findings: &findings, policy: &policy, has_derived: false };
//!
//! let state = transition(&WorkflowState::Idle, StepEvent::Started, &ctx).unwrap();
//! assert_eq!(state, WorkflowState::CheckingMissing);
//! let state = transition(&state, StepEvent::MissingChecked, &ctx).unwrap();
//! assert_eq!(state, WorkflowState::Publishing);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::registry::{ListingPage, RelationshipPair};
use crate::core::types::DocumentId;

/// A post-publish decision the editor may be asked to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionBranch {
    /// Add reciprocal references that are missing.
    Additions,
    /// Remove reciprocal references that are no longer reciprocated.
    Removals,
    /// Add a first-time published document to its listing page.
    Listing,
}

impl DecisionBranch {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionBranch::Additions => "additions",
            DecisionBranch::Removals => "removals",
            DecisionBranch::Listing => "listing",
        }
    }
}

impl fmt::Display for DecisionBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order in which decisions are offered after publish.
///
/// Branches left out of the order are never offered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionPolicy {
    order: Vec<DecisionBranch>,
}

impl DecisionPolicy {
    /// Build a policy, keeping the first occurrence of a repeated branch.
    pub fn new(order: Vec<DecisionBranch>) -> Self {
        let mut deduped = Vec::with_capacity(order.len());
        for branch in order {
            if !deduped.contains(&branch) {
                deduped.push(branch);
            }
        }
        Self { order: deduped }
    }

    pub fn order(&self) -> &[DecisionBranch] {
        &self.order
    }

    /// Branches that come after `current` (all of them when `None`).
    fn after(&self, current: Option<DecisionBranch>) -> &[DecisionBranch] {
        match current.and_then(|c| self.order.iter().position(|b| *b == c)) {
            Some(i) => &self.order[i + 1..],
            None if current.is_none() => &self.order,
            None => &[],
        }
    }
}

impl Default for DecisionPolicy {
    /// Additions, then removals, then the listing offer.
    fn default() -> Self {
        Self {
            order: vec![
                DecisionBranch::Additions,
                DecisionBranch::Removals,
                DecisionBranch::Listing,
            ],
        }
    }
}

/// A document a decision would patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTarget {
    /// The relationship, named from the published document's side.
    pub pair: RelationshipPair,
    /// Published id of the target.
    pub id: DocumentId,
    /// Display label for prompts.
    pub label: String,
}

/// What the checks found; the input to decision transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Findings {
    pub missing: Vec<PendingTarget>,
    pub orphaned: Vec<PendingTarget>,
    /// Listing page to offer, set only on first publish when the page does
    /// not list the document yet.
    pub listing: Option<ListingPage>,
}

/// How a workflow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// Publish succeeded and every decision branch was resolved.
    Completed,
    /// Publish failed; no decision branch ran.
    Aborted { error: String },
}

/// Current state of a publish workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    CheckingMissing,
    SyncingDerived,
    Publishing,
    CheckingOrphaned,
    AwaitingAdditionDecision { targets: Vec<PendingTarget> },
    AwaitingRemovalDecision { targets: Vec<PendingTarget> },
    AwaitingListingDecision { listing: ListingPage },
    Done(WorkflowOutcome),
}

impl WorkflowState {
    /// Short name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::CheckingMissing => "checking-missing",
            WorkflowState::SyncingDerived => "syncing-derived",
            WorkflowState::Publishing => "publishing",
            WorkflowState::CheckingOrphaned => "checking-orphaned",
            WorkflowState::AwaitingAdditionDecision { .. } => "awaiting-addition-decision",
            WorkflowState::AwaitingRemovalDecision { .. } => "awaiting-removal-decision",
            WorkflowState::AwaitingListingDecision { .. } => "awaiting-listing-decision",
            WorkflowState::Done(_) => "done",
        }
    }

    /// Check if the workflow has finished.
    pub fn is_done(&self) -> bool {
        matches!(self, WorkflowState::Done(_))
    }

    /// The decision this state is waiting on, if any.
    pub fn branch(&self) -> Option<DecisionBranch> {
        match self {
            WorkflowState::AwaitingAdditionDecision { .. } => Some(DecisionBranch::Additions),
            WorkflowState::AwaitingRemovalDecision { .. } => Some(DecisionBranch::Removals),
            WorkflowState::AwaitingListingDecision { .. } => Some(DecisionBranch::Listing),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A step that just finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    Started,
    MissingChecked,
    DerivedSynced,
    Published,
    PublishFailed(String),
    OrphansChecked,
    /// The pending decision was accepted, declined, closed or failed.
    Decided,
}

impl StepEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StepEvent::Started => "started",
            StepEvent::MissingChecked => "missing-checked",
            StepEvent::DerivedSynced => "derived-synced",
            StepEvent::Published => "published",
            StepEvent::PublishFailed(_) => "publish-failed",
            StepEvent::OrphansChecked => "orphans-checked",
            StepEvent::Decided => "decided",
        }
    }
}

/// Inputs a transition may consult besides the state itself.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub findings: &'a Findings,
    pub policy: &'a DecisionPolicy,
    /// Whether the entity mirrors a derived sort key before publish.
    pub has_derived: bool,
}

/// An event arrived in a state that does not accept it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event '{event}' is not valid in state '{state}'")]
pub struct TransitionError {
    pub state: &'static str,
    pub event: &'static str,
}

/// Compute the next state.
///
/// # Errors
///
/// Returns `TransitionError` when `event` cannot happen in `state`.
pub fn transition(
    state: &WorkflowState,
    event: StepEvent,
    ctx: &StepContext<'_>,
) -> Result<WorkflowState, TransitionError> {
    use WorkflowState as S;

    let next = match (state, event) {
        (S::Idle, StepEvent::Started) => S::CheckingMissing,
        (S::CheckingMissing, StepEvent::MissingChecked) if ctx.has_derived => S::SyncingDerived,
        (S::CheckingMissing, StepEvent::MissingChecked) => S::Publishing,
        (S::SyncingDerived, StepEvent::DerivedSynced) => S::Publishing,
        (S::Publishing, StepEvent::Published) => S::CheckingOrphaned,
        (S::Publishing, StepEvent::PublishFailed(error)) => {
            S::Done(WorkflowOutcome::Aborted { error })
        }
        (S::CheckingOrphaned, StepEvent::OrphansChecked) => next_decision(None, ctx),
        (current, StepEvent::Decided) if current.branch().is_some() => {
            next_decision(current.branch(), ctx)
        }
        (current, event) => {
            return Err(TransitionError {
                state: current.name(),
                event: event.name(),
            })
        }
    };
    Ok(next)
}

/// First branch after `current`, in policy order, that has something to decide.
fn next_decision(current: Option<DecisionBranch>, ctx: &StepContext<'_>) -> WorkflowState {
    for branch in ctx.policy.after(current) {
        let findings = ctx.findings;
        match branch {
            DecisionBranch::Additions if !findings.missing.is_empty() => {
                return WorkflowState::AwaitingAdditionDecision {
                    targets: findings.missing.clone(),
                }
            }
            DecisionBranch::Removals if !findings.orphaned.is_empty() => {
                return WorkflowState::AwaitingRemovalDecision {
                    targets: findings.orphaned.clone(),
                }
            }
            DecisionBranch::Listing => {
                if let Some(listing) = &findings.listing {
                    return WorkflowState::AwaitingListingDecision {
                        listing: listing.clone(),
                    };
                }
            }
            _ => {}
        }
    }
    WorkflowState::Done(WorkflowOutcome::Completed)
}
