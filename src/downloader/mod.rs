//! Core archiver implementation split into focused submodules.
//!
//! The `Archiver` struct and its methods are organized by domain:
//! - [`control`] - Stop requests and task queries
//! - [`download_task`] - Per-task part loop, error budget and cover queue
//! - [`stream`] - Lazy event stream, registry bookkeeping, running-task guard

mod control;
mod download_task;
mod stream;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use stream::TaskStream;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::{MediaFetcher, fetcher_from_config};
use crate::ledger::Ledger;
use crate::media::{CoverSource, HttpCoverSource, Id3TagWriter, TagWriter};
use crate::planner::{PageCountPlanner, PartPlanner};
use crate::registry::TaskRegistry;
use crate::types::{CollectionId, TaskId};
use download_task::TaskContext;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Capacity of a task's event channel; the fetch blocks once a slow consumer falls this far behind
const EVENT_BUFFER: usize = 256;

/// Pluggable collaborators of the orchestrator
#[derive(Clone)]
pub struct Collaborators {
    /// Resolves part metadata and downloads part audio
    pub fetcher: Arc<dyn MediaFetcher>,
    /// Counts the parts of a collection
    pub planner: Arc<dyn PartPlanner>,
    /// Fetches and normalizes cover art
    pub covers: Arc<dyn CoverSource>,
    /// Writes tags and covers into finished files
    pub tagger: Arc<dyn TagWriter>,
}

impl Collaborators {
    /// The production collaborators: yt-dlp, page-count probe, HTTP covers, ID3 tags
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            fetcher: fetcher_from_config(&config.tools),
            planner: Arc::new(PageCountPlanner::new(&config.download)?),
            covers: Arc::new(HttpCoverSource::new(
                config.download.socket_timeout,
                config.retry.clone(),
            )?),
            tagger: Arc::new(Id3TagWriter::default()),
        })
    }
}

/// Parameters of one download request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Collection to download
    pub collection: CollectionId,
    /// Directory under the output base the parts are written to
    pub output_dir: String,
    /// Rename finished parts to `{output_dir}-{part}.mp3`
    pub rename: bool,
}

/// Running tasks and their stop tokens
pub(crate) type RunningTasks = Arc<std::sync::Mutex<HashMap<TaskId, CancellationToken>>>;

/// Main archiver instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Archiver {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Completion ledger shared by every task
    pub(crate) ledger: Arc<Ledger>,
    /// Persisted task history
    pub(crate) registry: Arc<TaskRegistry>,
    /// Fetcher, planner, cover source and tag writer
    pub(crate) collaborators: Collaborators,
    /// Tasks currently streaming, keyed by task id
    pub(crate) running: RunningTasks,
}

impl Archiver {
    /// Create an archiver with the production collaborators
    ///
    /// Loads the ledger and task history from the configured paths. Missing or
    /// unreadable files start empty rather than failing.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use bili_archiver::{Archiver, Config};
    /// # #[tokio::main]
    /// # async fn main() -> bili_archiver::Result<()> {
    /// let archiver = Archiver::new(Config::default()).await?;
    /// let parts = archiver.check_playlist("BV1xx411c7mD").await?;
    /// println!("{parts} parts");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: Config) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config)?;
        Self::with_collaborators(config, collaborators).await
    }

    /// Create an archiver with explicit collaborators
    pub async fn with_collaborators(config: Config, collaborators: Collaborators) -> Result<Self> {
        tokio::fs::create_dir_all(&config.download.output_base_dir).await?;

        let ledger = Ledger::load(&config.persistence.ledger_path).await;
        let registry = TaskRegistry::load(&config.persistence.task_history_path).await;

        tracing::info!(
            output_base_dir = %config.download.output_base_dir.display(),
            ledger_entries = ledger.len().await,
            fetcher = collaborators.fetcher.name(),
            "archiver initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            ledger: Arc::new(ledger),
            registry: Arc::new(registry),
            collaborators,
            running: Arc::new(std::sync::Mutex::new(HashMap::new())),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Completion ledger
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Name of the active media fetcher (`yt-dlp`, `noop`, ...)
    pub fn fetcher_name(&self) -> &'static str {
        self.collaborators.fetcher.name()
    }

    /// Number of parts in the collection named by `input` (a raw id or any URL containing one)
    pub async fn check_playlist(&self, input: &str) -> Result<u32> {
        let collection = CollectionId::parse(input)?;
        Ok(self.collaborators.planner.plan(&collection).await)
    }

    /// Start downloading a collection and return its event stream
    ///
    /// Nothing is fetched until the stream is polled. The stream yields one
    /// [`DownloadEvent::Part`](crate::DownloadEvent::Part) per part event and
    /// ends with a single [`DownloadEvent::Finished`](crate::DownloadEvent::Finished).
    /// Dropping it early marks the task `failed`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] when `output_dir` is not a plain directory name
    /// - [`Error::TaskAlreadyRunning`] when the same task is already streaming
    /// - [`Error::Io`] when the output directory cannot be created
    pub async fn start_download(&self, request: DownloadRequest) -> Result<TaskStream> {
        validate_output_dir(&request.output_dir)?;

        let task_id = TaskId::for_request(&request.collection, &request.output_dir);
        if self.is_running(&task_id) {
            return Err(Error::TaskAlreadyRunning(task_id.0));
        }

        let base_path = self.config.task_output_dir(&request.output_dir);
        tokio::fs::create_dir_all(&base_path).await?;

        let cancel = CancellationToken::new();
        {
            let mut running = lock_running(&self.running);
            // re-checked under the lock; two requests may have raced past the first check
            if running.contains_key(&task_id) {
                return Err(Error::TaskAlreadyRunning(task_id.0));
            }
            running.insert(task_id.clone(), cancel.clone());
        }
        let mut guard = stream::RunGuard::new(
            task_id.clone(),
            self.running.clone(),
            self.registry.clone(),
        );

        let (task, run) = self
            .registry
            .begin(&request.collection, &request.output_dir, request.rename)
            .await;
        guard.bind(run);

        tracing::info!(
            task_id = %task_id,
            collection_id = %request.collection,
            output_dir = %request.output_dir,
            rename = request.rename,
            "download task created"
        );

        let (event_tx, event_rx) = tokio::sync::mpsc::channel(EVENT_BUFFER);
        let ctx = TaskContext {
            task_id,
            collection: request.collection,
            output_dir: request.output_dir,
            rename: request.rename,
            base_path,
            config: self.config.clone(),
            ledger: self.ledger.clone(),
            collaborators: self.collaborators.clone(),
            cancel,
            events: event_tx,
        };

        Ok(stream::task_stream(task, ctx, event_rx, self.registry.clone(), guard))
    }
}

/// Lock the running-task map, recovering from a poisoned lock
pub(crate) fn lock_running(
    running: &RunningTasks,
) -> std::sync::MutexGuard<'_, HashMap<TaskId, CancellationToken>> {
    running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `output_dir` must be a single path component below the output base
fn validate_output_dir(output_dir: &str) -> Result<()> {
    let trimmed = output_dir.trim();
    let invalid = trimmed.is_empty()
        || trimmed != output_dir
        || trimmed == "."
        || trimmed == ".."
        || trimmed.contains(['/', '\\'])
        || trimmed.contains('\0');

    if invalid {
        return Err(Error::InvalidRequest(format!(
            "output_dir must be a plain directory name, got {output_dir:?}"
        )));
    }
    Ok(())
}
