//! Download task context — state shared by every part of one task.

use crate::config::Config;
use crate::downloader::Collaborators;
use crate::ledger::Ledger;
use crate::media::PendingTag;
use crate::retry::ErrorBudget;
use crate::types::{CollectionId, DownloadEvent, PartOutcome, TaskId};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything a task run needs, moved into the run future
pub(crate) struct TaskContext {
    pub(crate) task_id: TaskId,
    pub(crate) collection: CollectionId,
    pub(crate) output_dir: String,
    pub(crate) rename: bool,
    /// `{output_base_dir}/{output_dir}`
    pub(crate) base_path: PathBuf,
    pub(crate) config: Arc<Config>,
    pub(crate) ledger: Arc<Ledger>,
    pub(crate) collaborators: Collaborators,
    /// Cancelled by `stop_task`; checked between parts
    pub(crate) cancel: CancellationToken,
    pub(crate) events: mpsc::Sender<DownloadEvent>,
}

impl TaskContext {
    /// Send a part event to the stream
    pub(super) async fn emit(&self, outcome: PartOutcome) {
        if self.events.send(DownloadEvent::Part(outcome)).await.is_err() {
            // receiver gone; the run is being torn down with its stream
            tracing::debug!(task_id = %self.task_id, "event stream closed");
        }
    }

    /// Whether finished parts get their canonical name
    pub(super) fn renames(&self) -> bool {
        self.rename && self.config.orchestrator.allow_rename
    }

    /// `{base_path}/{output_dir}-{part}.mp3`
    pub(super) fn canonical_path(&self, part: u32) -> PathBuf {
        self.base_path.join(format!("{}-{part}.mp3", self.output_dir))
    }
}

/// Mutable bookkeeping of a run
pub(super) struct RunState {
    pub(super) total: u32,
    pub(super) succeeded: u32,
    pub(super) skipped: u32,
    pub(super) budget: ErrorBudget,
    /// Finished parts waiting for tags, in completion order
    pub(super) covers: VecDeque<PendingTag>,
    pub(super) started: Instant,
}

impl RunState {
    pub(super) fn new(total: u32, config: &Config) -> Self {
        Self {
            total,
            succeeded: 0,
            skipped: 0,
            budget: ErrorBudget::new(
                config.orchestrator.error_ceiling,
                config.orchestrator.backoff_step,
            ),
            covers: VecDeque::new(),
            started: Instant::now(),
        }
    }
}

/// Overall task progress once `done` parts are finished and the current one is `percent` through
pub(super) fn overall_progress(done: u32, percent: f64, total: u32) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let value = (f64::from(done) + percent.clamp(0.0, 100.0) / 100.0) / f64::from(total) * 100.0;
    (value * 100.0).round() / 100.0
}
