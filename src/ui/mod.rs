//! ui
//!
//! User interaction utilities.
//!
//! # Modules
//!
//! - [`prompts`] - The confirmation boundary used by workflows
//! - [`output`] - Output formatting and display
//!
//! # Design
//!
//! All output and prompts go through this module so interactive and
//! non-interactive runs behave the same way apart from who answers.

pub mod output;
pub mod prompts;
