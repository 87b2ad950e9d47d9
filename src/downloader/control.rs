//! Task control — stop requests, status queries and manual status updates.

use crate::error::{Error, Result};
use crate::types::{Task, TaskId, TaskStatus};

use super::{Archiver, lock_running};

impl Archiver {
    /// Ask a running task to stop
    ///
    /// The signal is observed between parts: the part in flight finishes (or
    /// fails) first, then the queued covers are embedded and the stream ends
    /// with a `stopped` summary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no task with this id is streaming.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use bili_archiver::*;
    /// # async fn example(archiver: Archiver) -> Result<()> {
    /// archiver.stop_task(&TaskId::from("BV1xx411c7mD_novel")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn stop_task(&self, task_id: &TaskId) -> Result<()> {
        let token = lock_running(&self.running).get(task_id).cloned();
        match token {
            Some(token) => {
                token.cancel();
                tracing::info!(%task_id, "stop requested");
                Ok(())
            }
            None => Err(Error::NotFound(format!("running task {task_id}"))),
        }
    }

    /// Whether a task with this id is currently streaming
    pub fn is_running(&self, task_id: &TaskId) -> bool {
        lock_running(&self.running).contains_key(task_id)
    }

    /// Last known state of a task
    pub async fn task_status(&self, task_id: &TaskId) -> Result<Task> {
        self.registry
            .get(task_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))
    }

    /// Tasks that have not completed, oldest first
    pub async fn unfinished_tasks(&self) -> Vec<Task> {
        self.registry.unfinished().await
    }

    /// Most recently modified task
    pub async fn latest_task(&self) -> Option<Task> {
        self.registry.latest().await
    }

    /// Overwrite a task's status on a client's request
    pub async fn update_task_status(
        &self,
        task_id: &TaskId,
        status: TaskStatus,
        progress: Option<f64>,
    ) -> Result<Task> {
        let task = self.registry.update_status(task_id, status, progress).await?;
        tracing::debug!(%task_id, ?status, progress = task.progress, "task status updated by client");
        Ok(task)
    }
}
