//! workflow
//!
//! User-confirmed workflows around publish and delete.
//!
//! # Modules
//!
//! - [`state`] - Workflow states, events and the pure transition function
//! - [`publish`] - The publish reconciliation driver
//! - [`delete`] - The cascading delete guard
//! - [`actions`] - Publish and delete actions for a hosting UI
//!
//! # Invariants
//!
//! - Reciprocal references are checked and repaired only here, at the
//!   boundaries of publish and delete
//! - Every repair is confirmed by the editor first
//! - A workflow instance runs once and holds no state between runs

pub mod actions;
pub mod delete;
pub mod publish;
pub mod state;

pub use actions::{
    document_type, ActionDescriptor, ActionError, ActionFactory, ActionKind, DeleteAction,
    PublishAction,
};
pub use delete::{
    confirm_delete, prepare_delete, CascadingDeleteGuard, DeleteError, DeleteOutcome,
    DeleteReport, DeleteSummary, ReferrerGroup,
};
pub use publish::{
    DecisionRecord, ReconciliationWorkflow, WorkflowError, WorkflowHandle, WorkflowReport,
};
pub use state::{
    transition, DecisionBranch, DecisionPolicy, Findings, PendingTarget, StepContext, StepEvent,
    TransitionError, WorkflowOutcome, WorkflowState,
};
