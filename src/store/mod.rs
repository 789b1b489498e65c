//! store
//!
//! Abstraction over the revisioned document store.
//!
//! # Architecture
//!
//! The `DocumentStore` trait is the only way reconciliation code touches
//! documents. Commands use [`create_store`] rather than naming a backend.
//!
//! - Store operations are single calls that succeed or return one error
//! - There are no cross-document transactions; every patch stands alone
//! - Drafts and published revisions are separate documents
//!
//! # Modules
//!
//! - `traits`: `DocumentStore` trait, filters, patches, errors
//! - [`memory`]: In-memory store for tests and dry runs
//! - [`file`]: JSON dataset file with an exclusive file lock
//! - [`http`]: Hosted content API client
//! - `factory`: Store selection from configuration

mod factory;
pub mod file;
pub mod http;
pub mod memory;
mod traits;

pub use factory::{
    create_store, valid_store_kinds, FactoryError, StoreKind, DEFAULT_API_VERSION,
    DEFAULT_TOKEN_ENV,
};
pub use traits::*;
