//! refsync - bidirectional reference consistency for revisioned documents
//!
//! Documents in a draft/published store often reference each other in both
//! directions: an event lists its artists and each artist lists its events.
//! refsync keeps the two sides in agreement at the two moments that matter,
//! publish and delete, and only with the editor's confirmation.
//!
//! # Architecture
//!
//! - [`core`] - Document types, the relationship registry and configuration
//! - [`store`] - The document store trait and its memory, file and HTTP backends
//! - [`sync`] - Reference diffing, reciprocal patches and derived fields
//! - [`workflow`] - The publish reconciliation workflow and the delete guard
//! - [`ui`] - Confirmation prompts and output
//! - [`cli`] - Command-line interface
//!
//! # Correctness Invariants
//!
//! 1. Reciprocal repairs are applied only after confirmation
//! 2. Repairs are idempotent; running one twice changes nothing the second time
//! 3. A failure on one target never stops the others
//! 4. A document is deleted only after references to it are stripped

pub mod cli;
pub mod core;
pub mod store;
pub mod sync;
pub mod ui;
pub mod workflow;
