//! delete command - Delete with reference cleanup

use anyhow::Result;

use super::resolve;
use crate::cli::Context;
use crate::ui::output::{self, format_count, format_list};
use crate::workflow::{ActionFactory, DeleteOutcome};

/// Delete a document after stripping references to it.
pub async fn delete(ctx: &Context, id: &str) -> Result<()> {
    let store = ctx.store()?;
    let (doc_id, doc_type) = resolve(store.as_ref(), id).await?;
    let action = ActionFactory::new(ctx.config.registry()).delete(&doc_type, &doc_id)?;

    let confirmer = ctx.confirmer();
    match action.handle(store.as_ref(), confirmer.as_ref()).await? {
        DeleteOutcome::Cancelled => output::print("Delete cancelled", ctx.verbosity),
        DeleteOutcome::Deleted(summary) => {
            for line in &summary.diagnostics {
                output::warn(line, ctx.verbosity);
            }
            for failure in &summary.failures {
                output::warn(failure, ctx.verbosity);
            }
            if !summary.stripped.is_empty() {
                output::print(
                    format!(
                        "Removed references from {}",
                        format_count(summary.stripped.len(), "document")
                    ),
                    ctx.verbosity,
                );
            }
            output::print(format!("Deleted {}", doc_id), ctx.verbosity);
            output::print(format_list(&summary.deleted, "  - "), ctx.verbosity);
            if ctx.dry_run {
                output::print("Dry run: no changes were written", ctx.verbosity);
            }
        }
    }
    Ok(())
}
