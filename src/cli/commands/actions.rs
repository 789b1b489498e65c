//! actions command - Show available document actions

use anyhow::Result;

use super::resolve;
use crate::cli::Context;
use crate::ui::output;
use crate::workflow::{ActionDescriptor, ActionFactory};

/// Print the publish and delete action descriptors for a document.
pub async fn actions(ctx: &Context, id: &str) -> Result<()> {
    let store = ctx.store()?;
    let (doc_id, doc_type) = resolve(store.as_ref(), id).await?;
    let factory = ActionFactory::new(ctx.config.registry());

    let publish = factory.publish(&doc_type, &doc_id)?.describe(store.as_ref()).await?;
    let delete = factory.delete(&doc_type, &doc_id)?.describe(store.as_ref()).await?;

    output::print(format!("{} ({})", doc_id, doc_type), ctx.verbosity);
    for descriptor in [publish, delete] {
        output::print(describe(&descriptor), ctx.verbosity);
    }
    Ok(())
}

fn describe(descriptor: &ActionDescriptor) -> String {
    match (&descriptor.reason, descriptor.disabled) {
        (Some(reason), true) => format!("  {}: disabled ({})", descriptor.label, reason),
        (None, true) => format!("  {}: disabled", descriptor.label),
        _ => format!("  {}: enabled", descriptor.label),
    }
}
