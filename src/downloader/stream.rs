//! Task event stream
//!
//! The run future is driven by the stream itself, so nothing happens until
//! the caller polls it and the stream cannot be restarted once it ended.
//! Every event is folded into the task registry before it is yielded.

use super::download_task::{TaskContext, run_task};
use super::{RunningTasks, lock_running};
use crate::registry::{RunId, TaskRegistry};
use crate::types::{DownloadEvent, Task, TaskId, TaskSummary};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

type RunFuture = Pin<Box<dyn Future<Output = TaskSummary> + Send>>;

/// Lazy, finite stream of a task's events
///
/// Yields [`DownloadEvent::Part`] items while the task runs and exactly one
/// [`DownloadEvent::Finished`] as its last item.
pub struct TaskStream {
    task: Task,
    inner: Pin<Box<dyn Stream<Item = DownloadEvent> + Send>>,
}

impl TaskStream {
    /// The task as it was registered when the stream was created
    pub fn task(&self) -> &Task {
        &self.task
    }
}

impl std::fmt::Debug for TaskStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStream")
            .field("task_id", &self.task.task_id)
            .finish_non_exhaustive()
    }
}

impl Stream for TaskStream {
    type Item = DownloadEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// Releases the task's running slot when the stream goes away
///
/// A stream dropped before its summary was yielded leaves the task `failed`,
/// unless a newer run of the same task has begun by then.
pub(super) struct RunGuard {
    task_id: TaskId,
    running: RunningTasks,
    registry: Arc<TaskRegistry>,
    run: Option<RunId>,
    finished: bool,
}

impl RunGuard {
    pub(super) fn new(task_id: TaskId, running: RunningTasks, registry: Arc<TaskRegistry>) -> Self {
        Self {
            task_id,
            running,
            registry,
            run: None,
            finished: false,
        }
    }

    /// Bind the guard to the registry run it owns
    pub(super) fn bind(&mut self, run: RunId) {
        self.run = Some(run);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        lock_running(&self.running).remove(&self.task_id);
        if self.finished {
            return;
        }

        // dropped before the task was registered; there is nothing to mark
        let Some(run) = self.run else {
            return;
        };

        tracing::warn!(task_id = %self.task_id, "event stream dropped before the task finished");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let registry = self.registry.clone();
            let task_id = self.task_id.clone();
            handle.spawn(async move {
                if registry.abandon(&task_id, run).await {
                    tracing::debug!(%task_id, "abandoned task marked failed");
                }
            });
        }
    }
}

struct Driver {
    run: Option<RunFuture>,
    summary: Option<TaskSummary>,
    events: mpsc::Receiver<DownloadEvent>,
    registry: Arc<TaskRegistry>,
    guard: RunGuard,
}

enum Step {
    Event(DownloadEvent),
    RunFinished(TaskSummary),
    Drained,
}

impl Driver {
    async fn next_step(&mut self) -> Step {
        match self.run.as_mut() {
            Some(run) => tokio::select! {
                biased;
                Some(event) = self.events.recv() => Step::Event(event),
                summary = run => Step::RunFinished(summary),
            },
            None => match self.events.recv().await {
                Some(event) => Step::Event(event),
                None => Step::Drained,
            },
        }
    }
}

pub(super) fn task_stream(
    task: Task,
    ctx: TaskContext,
    events: mpsc::Receiver<DownloadEvent>,
    registry: Arc<TaskRegistry>,
    guard: RunGuard,
) -> TaskStream {
    let driver = Driver {
        run: Some(Box::pin(run_task(ctx))),
        summary: None,
        events,
        registry,
        guard,
    };

    let inner = futures::stream::unfold(Some(driver), |driver| async move {
        let mut driver = driver?;
        loop {
            match driver.next_step().await {
                Step::Event(event) => {
                    if let DownloadEvent::Part(outcome) = &event {
                        driver
                            .registry
                            .apply_outcome(&driver.guard.task_id, outcome)
                            .await;
                    }
                    return Some((event, Some(driver)));
                }
                Step::RunFinished(summary) => {
                    // the run dropped its sender; drain what is left before finishing
                    driver.run = None;
                    driver.summary = Some(summary);
                }
                Step::Drained => {
                    let summary = driver.summary.take()?;
                    driver.registry.finish(&summary).await;
                    driver.guard.finished = true;
                    return Some((DownloadEvent::Finished(summary), None));
                }
            }
        }
    });

    TaskStream {
        task,
        inner: Box::pin(inner),
    }
}
