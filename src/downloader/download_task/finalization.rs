//! Task finalization — tag the finished parts and summarize the run.

use super::context::{RunState, TaskContext};
use crate::media::TagWriter;
use crate::types::{RunOutcome, TaskSummary};

/// Drain the cover queue in FIFO order, then build the summary
///
/// Runs for every terminal outcome so parts finished before a failure or a
/// stop still get their tags.
pub(super) async fn finalize(
    ctx: &TaskContext,
    mut state: RunState,
    outcome: RunOutcome,
) -> TaskSummary {
    let queued = state.covers.len();
    let mut tagged = 0;
    while let Some(item) = state.covers.pop_front() {
        if embed(ctx.collaborators.tagger.as_ref(), &item).await {
            tagged += 1;
        }
    }
    if queued > 0 {
        tracing::info!(queued, tagged, "cover queue drained");
    }

    let summary = TaskSummary {
        task_id: ctx.task_id.clone(),
        total: state.total,
        succeeded: state.succeeded,
        skipped: state.skipped,
        errors: state.budget.errors(),
        outcome,
        elapsed_secs: state.started.elapsed().as_secs_f64(),
    };

    tracing::info!(
        total = summary.total,
        succeeded = summary.succeeded,
        skipped = summary.skipped,
        errors = summary.errors,
        elapsed_secs = summary.elapsed_secs,
        outcome = ?summary.outcome,
        "task finished"
    );

    summary
}

async fn embed(tagger: &dyn TagWriter, item: &crate::media::PendingTag) -> bool {
    match tagger.write_tags(item).await {
        Ok(()) => {
            tracing::debug!(path = %item.path.display(), cover = item.cover.is_some(), "tags written");
            true
        }
        Err(e) => {
            tracing::warn!(path = %item.path.display(), error = %e, "failed to write tags");
            false
        }
    }
}
