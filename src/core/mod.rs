//! core
//!
//! Core domain types, schemas, and configuration for refsync.
//!
//! # Modules
//!
//! - [`types`] - Strong types: DocumentId, ArrayKey, Reference, Document
//! - [`registry`] - Relationship pairs and per-entity settings
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid ids at the boundary
//! - Schemas are strict and self-describing
//! - The registry is data; behavior lives in `sync` and `workflow`

pub mod config;
pub mod registry;
pub mod types;
