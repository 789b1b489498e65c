//! sync
//!
//! Detection and repair of reciprocal references.
//!
//! # Modules
//!
//! - [`diff`] - Find missing and orphaned reciprocal references (reads only)
//! - [`patch`] - Add or remove reciprocal references on target documents
//! - [`derived`] - Mirror a scalar from a referenced document into a sort key
//!
//! # Error Model
//!
//! Diffs and derived-field sync are diagnostic: a failure is logged and the
//! caller carries on with an empty result. Repairs capture each target's
//! failure in their report and move on to the next target. Nothing here
//! retries.

pub mod derived;
pub mod diff;
pub mod patch;

pub use derived::{sync_derived_field, SyncOutcome};
pub use diff::{
    find_missing_reciprocal, find_orphaned_reciprocal, DiffError, DiffReport, TargetFailure,
};
pub use patch::{
    add_reciprocal, add_to_listing, listing_contains, remove_reciprocal, ListingOutcome,
    PatchReport,
};
