//! check command - Read-only reciprocal reference report

use anyhow::Result;
use tracing::warn;

use super::resolve;
use crate::cli::Context;
use crate::core::registry::Registry;
use crate::core::types::Document;
use crate::sync::{find_missing_reciprocal, find_orphaned_reciprocal, DiffError, DiffReport};
use crate::ui::output::{self, format_count, format_list};

/// Report missing and orphaned reciprocal references for one document.
pub async fn check(ctx: &Context, id: &str) -> Result<()> {
    let store = ctx.store()?;
    let (doc_id, doc_type) = resolve(store.as_ref(), id).await?;
    let registry = ctx.config.registry();

    let pairs: Vec<_> = registry.pairs_from(&doc_type).cloned().collect();
    if pairs.is_empty() {
        output::print(
            format!("No relationships declared for type '{}'", doc_type),
            ctx.verbosity,
        );
        return Ok(());
    }

    let mut problems = 0;
    for pair in &pairs {
        output::print(format!("{}", pair), ctx.verbosity);

        let missing = find_missing_reciprocal(store.as_ref(), &doc_id, pair).await?;
        problems += missing.targets.len();
        print_section("missing", &missing, &pair.target_type, &registry, ctx);

        match find_orphaned_reciprocal(store.as_ref(), &doc_id, pair).await {
            Ok(orphaned) => {
                problems += orphaned.targets.len();
                print_section("orphaned", &orphaned, &pair.target_type, &registry, ctx);
            }
            Err(DiffError::SourceMissing(_)) => {
                output::print("  orphaned: not published yet", ctx.verbosity);
            }
            Err(e) => return Err(e.into()),
        }
    }

    if problems == 0 {
        output::print("References are consistent", ctx.verbosity);
    } else {
        output::print(
            format!("{} to reconcile", format_count(problems, "reference")),
            ctx.verbosity,
        );
    }
    Ok(())
}

fn print_section(
    title: &str,
    report: &DiffReport,
    target_type: &str,
    registry: &Registry,
    ctx: &Context,
) {
    for failure in &report.failures {
        warn!(target = %failure.id, error = %failure.error, "skipped target");
        output::warn(failure, ctx.verbosity);
    }
    if report.is_empty() {
        output::print(format!("  {}: none", title), ctx.verbosity);
        return;
    }
    let noun = registry
        .entity(target_type)
        .map(|e| e.label.to_lowercase())
        .unwrap_or_else(|| target_type.to_string());
    output::print(
        format!("  {}: {}", title, format_count(report.targets.len(), &noun)),
        ctx.verbosity,
    );
    output::print(
        format_list(&labels(&report.targets, registry), "    - "),
        ctx.verbosity,
    );
}

fn labels(docs: &[Document], registry: &Registry) -> Vec<String> {
    docs.iter()
        .map(|doc| {
            let label = doc.label(registry.title_field(&doc.doc_type));
            if label == doc.id.as_str() {
                label
            } else {
                format!("{} ({})", label, doc.id)
            }
        })
        .collect()
}
