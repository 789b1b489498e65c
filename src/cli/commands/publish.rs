//! publish command - Publish with reciprocal reconciliation

use anyhow::Result;

use super::resolve;
use crate::cli::Context;
use crate::sync::SyncOutcome;
use crate::ui::output::{self, format_count};
use crate::workflow::{ActionFactory, WorkflowReport};

/// Publish a draft and run the reconciliation workflow.
///
/// A failed publish surfaces as an error; repair failures are printed as
/// warnings and do not fail the command.
pub async fn publish(ctx: &Context, id: &str) -> Result<()> {
    let store = ctx.store()?;
    let (doc_id, doc_type) = resolve(store.as_ref(), id).await?;
    let factory = ActionFactory::new(ctx.config.registry()).with_policy(ctx.config.policy());
    let action = factory.publish(&doc_type, &doc_id)?;

    let confirmer = ctx.confirmer();
    let report = action.handle(store.as_ref(), confirmer.as_ref()).await?;
    print_report(&report, ctx);

    if ctx.dry_run {
        output::print("Dry run: no changes were written", ctx.verbosity);
    }
    Ok(())
}

fn print_report(report: &WorkflowReport, ctx: &Context) {
    let v = ctx.verbosity;
    for line in &report.diagnostics {
        output::warn(line, v);
    }

    match &report.derived {
        Some(SyncOutcome::Updated(value)) => {
            output::print(format!("Synced derived field to {}", value), v)
        }
        Some(SyncOutcome::Failed(message)) => {
            output::warn(format!("derived field not synced: {}", message), v)
        }
        _ => {}
    }

    let verb = if report.first_publish {
        "Published (first time)"
    } else {
        "Published"
    };
    output::print(format!("{} {}", verb, report.doc_id), v);

    for decision in &report.decisions {
        let answer = if decision.accepted { "accepted" } else { "declined" };
        output::print(
            format!(
                "{}: {}, {} patched",
                decision.branch,
                answer,
                format_count(decision.applied.len(), "document")
            ),
            v,
        );
        for failure in &decision.failures {
            output::warn(failure, v);
        }
    }
}
