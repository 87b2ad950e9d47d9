//! Top-level task lifecycle — plan, then walk the parts in order.

use super::context::{RunState, TaskContext, overall_progress};
use super::finalization::finalize;
use super::part::{PartDone, process_part};
use crate::retry::RetryDecision;
use crate::types::{PartOutcome, RunOutcome, TaskSummary};
use crate::utils::remove_artifacts;
use tracing::Instrument;

/// Run a task to completion
///
/// Parts are processed strictly in order. A failed attempt is retried on the
/// same part after a linear backoff until the task-wide error budget is
/// spent, at which point the remaining parts are abandoned. A stop request
/// is honored before the next part starts.
pub(crate) async fn run_task(ctx: TaskContext) -> TaskSummary {
    let span = tracing::info_span!(
        "task",
        task_id = %ctx.task_id,
        collection_id = %ctx.collection,
    );
    run_parts(ctx).instrument(span).await
}

async fn run_parts(ctx: TaskContext) -> TaskSummary {
    let total = ctx.collaborators.planner.plan(&ctx.collection).await.max(1);
    tracing::info!(total, output = %ctx.base_path.display(), "task started");

    let mut state = RunState::new(total, &ctx.config);
    let mut part = 1;

    let outcome = loop {
        if part > total {
            break RunOutcome::Completed;
        }
        if ctx.cancel.is_cancelled() {
            tracing::info!(next_part = part, "stop requested, not starting further parts");
            break RunOutcome::Stopped;
        }

        match process_part(&ctx, part, total).await {
            Ok(PartDone::Skipped(path)) => {
                state.skipped += 1;
                ctx.emit(PartOutcome::skip(part, path, overall_progress(part, 0.0, total)))
                    .await;
                part += 1;
            }
            Ok(PartDone::Downloaded { path, pending }) => {
                state.succeeded += 1;
                state.covers.push_back(pending);
                ctx.emit(PartOutcome::success(part, path, overall_progress(part, 0.0, total)))
                    .await;
                part += 1;
            }
            Err(failure) => {
                let decision = state.budget.record_failure();
                tracing::error!(
                    part,
                    errors = state.budget.errors(),
                    error = %failure.error,
                    "part attempt failed"
                );

                if let Some(base) = &failure.output_base {
                    let removed =
                        remove_artifacts(base, &ctx.config.cleanup.failure_suffixes).await;
                    tracing::debug!(part, removed, "removed artifacts of failed attempt");
                }

                ctx.emit(PartOutcome::error(
                    part,
                    &failure.error.to_string(),
                    overall_progress(part, 0.0, total),
                    state.budget.retries_remaining(),
                ))
                .await;

                match decision {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::info!(part, delay_ms = delay.as_millis(), "retrying part");
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = ctx.cancel.cancelled() => {}
                        }
                    }
                    RetryDecision::Exhausted => {
                        tracing::error!(
                            part,
                            remaining_parts = total - part,
                            "error ceiling reached, abandoning task"
                        );
                        break RunOutcome::Failed;
                    }
                }
            }
        }
    };

    finalize(&ctx, state, outcome).await
}
