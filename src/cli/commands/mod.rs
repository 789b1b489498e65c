//! cli::commands
//!
//! Command handlers.
//!
//! Each handler resolves the document named on the command line, runs the
//! matching library operation against the configured store and prints
//! the result through [`crate::ui::output`].

mod actions;
mod check;
mod completion;
mod config_cmd;
mod delete;
mod publish;

pub use actions::actions;
pub use check::check;
pub use completion::completion;
pub use delete::delete;
pub use publish::publish;

use anyhow::{anyhow, Context as _, Result};

use super::args::{Command, ConfigAction};
use super::Context;
use crate::core::types::DocumentId;
use crate::store::DocumentStore;
use crate::workflow::document_type;

/// Dispatch a command to its handler.
pub async fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Check { id } => check(ctx, &id).await,
        Command::Publish { id } => publish(ctx, &id).await,
        Command::Delete { id } => delete(ctx, &id).await,
        Command::Actions { id } => actions(ctx, &id).await,
        Command::Config { action } => match action {
            ConfigAction::Show => config_cmd::show(ctx),
            ConfigAction::Validate => config_cmd::validate(ctx),
            ConfigAction::Init { path, force } => config_cmd::init(ctx, &path, force),
        },
        Command::Completion { shell } => completion(shell),
    }
}

/// Parse an id and look up its document type.
///
/// Returns the published id, whichever form was given.
async fn resolve(store: &dyn DocumentStore, id: &str) -> Result<(DocumentId, String)> {
    let doc_id = DocumentId::new(id)?.published();
    let doc_type = document_type(store, &doc_id)
        .await
        .with_context(|| format!("failed to read document '{}'", doc_id))?
        .ok_or_else(|| anyhow!("document '{}' not found", doc_id))?;
    Ok((doc_id, doc_type))
}
