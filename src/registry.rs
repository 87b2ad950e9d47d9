//! Persisted task history
//!
//! One JSON document `{"tasks": [...]}` rewritten wholesale on every mutation.
//! The registry only records state; deciding whether a task may start is the
//! [`Archiver`](crate::Archiver)'s job.

use crate::error::{Error, Result};
use crate::types::{CollectionId, OutcomeStatus, PartOutcome, Task, TaskId, TaskStatus, TaskSummary};
use crate::utils::write_json_atomic;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskHistory {
    #[serde(default)]
    tasks: Vec<Task>,
    /// Latest run started for each task in this process
    #[serde(skip)]
    runs: HashMap<TaskId, RunId>,
    #[serde(skip)]
    next_run: u64,
}

/// Identifies one [`TaskRegistry::begin`] of a task within this process
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunId(u64);

impl TaskHistory {
    /// Last entry with the id; history files from older releases may hold duplicates
    fn find_mut(&mut self, task_id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().rev().find(|t| &t.task_id == task_id)
    }
}

/// Task history store
#[derive(Debug)]
pub struct TaskRegistry {
    path: PathBuf,
    history: Mutex<TaskHistory>,
}

impl TaskRegistry {
    /// Load the history from `path`; missing or corrupt files start empty
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let history = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                error!(path = %path.display(), error = %e, "task history unreadable, starting empty");
                TaskHistory::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => TaskHistory::default(),
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to read task history, starting empty");
                TaskHistory::default()
            }
        };

        Self {
            path,
            history: Mutex::new(history),
        }
    }

    /// History file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create (or reset) the task for a download request in `pending` state
    ///
    /// The returned [`RunId`] supersedes every earlier run of the same task.
    pub async fn begin(
        &self,
        collection: &CollectionId,
        output_dir: &str,
        rename: bool,
    ) -> (Task, RunId) {
        let task = Task {
            task_id: TaskId::for_request(collection, output_dir),
            bvid: collection.clone(),
            output_dir: output_dir.to_string(),
            rename,
            status: TaskStatus::Pending,
            progress: 0.0,
            last_update: now(),
        };

        let mut history = self.history.lock().await;
        match history.find_mut(&task.task_id) {
            Some(existing) => *existing = task.clone(),
            None => history.tasks.push(task.clone()),
        }
        history.next_run += 1;
        let run = RunId(history.next_run);
        history.runs.insert(task.task_id.clone(), run);
        self.persist(&history).await;
        (task, run)
    }

    /// Mark a run whose stream went away as `failed`
    ///
    /// Does nothing once the task has been restarted by a newer run or has
    /// already reached a terminal status. Returns whether the task was changed.
    pub async fn abandon(&self, task_id: &TaskId, run: RunId) -> bool {
        let mut history = self.history.lock().await;
        if history.runs.get(task_id) != Some(&run) {
            debug!(%task_id, "abandoned run was superseded, leaving task as is");
            return false;
        }
        let Some(task) = history.find_mut(task_id) else {
            return false;
        };
        if task.status.is_terminal() {
            return false;
        }

        task.status = TaskStatus::Failed;
        task.last_update = now();
        self.persist(&history).await;
        true
    }

    /// Fold one streamed event into the task: it is `running` with the event's progress
    pub async fn apply_outcome(&self, task_id: &TaskId, outcome: &PartOutcome) {
        let mut history = self.history.lock().await;
        let Some(task) = history.find_mut(task_id) else {
            warn!(%task_id, "event for unknown task");
            return;
        };

        task.status = TaskStatus::Running;
        if outcome.status != OutcomeStatus::Progress || outcome.progress >= task.progress {
            task.progress = outcome.progress;
        }
        task.last_update = now();
        self.persist(&history).await;
    }

    /// Record the terminal status of a finished run
    pub async fn finish(&self, summary: &TaskSummary) {
        let status = summary.terminal_status();
        let mut history = self.history.lock().await;
        let Some(task) = history.find_mut(&summary.task_id) else {
            warn!(task_id = %summary.task_id, "summary for unknown task");
            return;
        };

        task.status = status;
        if status == TaskStatus::Completed {
            task.progress = 100.0;
        }
        task.last_update = now();
        self.persist(&history).await;
    }

    /// Overwrite a task's status (and optionally progress) on a client's request
    pub async fn update_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        progress: Option<f64>,
    ) -> Result<Task> {
        let mut history = self.history.lock().await;
        let task = history
            .find_mut(task_id)
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;

        task.status = status;
        if let Some(progress) = progress {
            task.progress = progress.clamp(0.0, 100.0);
        }
        task.last_update = now();
        let updated = task.clone();
        self.persist(&history).await;
        Ok(updated)
    }

    /// Current state of a task
    pub async fn get(&self, task_id: &TaskId) -> Option<Task> {
        let history = self.history.lock().await;
        history.tasks.iter().rev().find(|t| &t.task_id == task_id).cloned()
    }

    /// Tasks that are not `completed`
    pub async fn unfinished(&self) -> Vec<Task> {
        let history = self.history.lock().await;
        history
            .tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Completed)
            .cloned()
            .collect()
    }

    /// Most recently modified task
    pub async fn latest(&self) -> Option<Task> {
        let history = self.history.lock().await;
        history.tasks.iter().max_by_key(|t| t.last_update).cloned()
    }

    async fn persist(&self, history: &TaskHistory) {
        match write_json_atomic(&self.path, history).await {
            Ok(()) => debug!(path = %self.path.display(), tasks = history.tasks.len(), "saved task history"),
            Err(e) => error!(path = %self.path.display(), error = %e, "failed to save task history"),
        }
    }
}

fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}
