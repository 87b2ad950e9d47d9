//! Core types for bili-archiver

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;
use utoipa::ToSchema;

static COLLECTION_ID_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"BV[a-zA-Z0-9]+").ok());

/// Identifier of a multi-part collection on the video site (a `BV…` id)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    /// Extract a collection id from a bare id or any URL that contains one
    ///
    /// ```
    /// use bili_archiver::CollectionId;
    ///
    /// let id = CollectionId::parse("https://www.bilibili.com/video/BV1GJ411x7h7?p=2").unwrap();
    /// assert_eq!(id.as_str(), "BV1GJ411x7h7");
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        COLLECTION_ID_PATTERN
            .as_ref()
            .and_then(|re| re.find(input))
            .map(|m| Self(m.as_str().to_string()))
            .ok_or_else(|| Error::InvalidCollectionId(input.to_string()))
    }

    /// The raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for CollectionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Identifier of a task: `"{collection_id}_{output_dir}"`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Task id for downloading `collection` into `output_dir`
    pub fn for_request(collection: &CollectionId, output_dir: &str) -> Self {
        Self(format!("{collection}_{output_dir}"))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Status of a single part attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Fetch in flight
    Progress,
    /// Part already complete on disk
    Skip,
    /// Part downloaded and recorded
    Success,
    /// Part attempt failed
    Error,
}

/// One event in a task's progress stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PartOutcome {
    /// 1-based part index
    pub part: u32,

    /// What happened
    pub status: OutcomeStatus,

    /// Human-readable description
    pub message: String,

    /// Overall task progress (0.0 to 100.0)
    pub progress: f64,

    /// Errors the task may still absorb before failing (error events only)
    #[serde(rename = "retries_left", skip_serializing_if = "Option::is_none")]
    pub retries_remaining: Option<u32>,

    /// Transfer speed reported by the fetcher (progress events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,

    /// Estimated time left for the part (progress events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,

    /// File the part lives in (skip and success events)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub file_path: Option<PathBuf>,
}

impl PartOutcome {
    fn new(part: u32, status: OutcomeStatus, message: String, progress: f64) -> Self {
        Self {
            part,
            status,
            message,
            progress,
            retries_remaining: None,
            speed: None,
            eta: None,
            file_path: None,
        }
    }

    /// In-flight progress of a part
    pub fn progress(part: u32, progress: f64, speed: Option<String>, eta: Option<String>) -> Self {
        let mut outcome = Self::new(
            part,
            OutcomeStatus::Progress,
            format!("downloading part {part}"),
            progress,
        );
        outcome.speed = speed;
        outcome.eta = eta;
        outcome
    }

    /// Part was already complete
    pub fn skip(part: u32, path: PathBuf, progress: f64) -> Self {
        let mut outcome = Self::new(
            part,
            OutcomeStatus::Skip,
            format!("skipped existing file: {}", display_name(&path)),
            progress,
        );
        outcome.file_path = Some(path);
        outcome
    }

    /// Part finished
    pub fn success(part: u32, path: PathBuf, progress: f64) -> Self {
        let mut outcome = Self::new(
            part,
            OutcomeStatus::Success,
            format!("downloaded: {}", display_name(&path)),
            progress,
        );
        outcome.file_path = Some(path);
        outcome
    }

    /// Part attempt failed
    pub fn error(part: u32, reason: &str, progress: f64, retries_remaining: u32) -> Self {
        let mut outcome = Self::new(
            part,
            OutcomeStatus::Error,
            format!("download failed: {reason}"),
            progress,
        );
        outcome.retries_remaining = Some(retries_remaining);
        outcome
    }
}

fn display_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Persisted task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Requested, not yet streaming
    Pending,
    /// Streaming events
    Running,
    /// Stopped early with at least one part done
    SuccessPartial,
    /// Error ceiling reached, or stopped with nothing done
    Failed,
    /// Every part skipped or downloaded
    Completed,
}

impl TaskStatus {
    /// Whether the task has stopped for good
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::SuccessPartial | TaskStatus::Failed | TaskStatus::Completed
        )
    }
}

/// One download request and its last known state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Task {
    /// `"{bvid}_{output_dir}"`
    pub task_id: TaskId,

    /// Collection being downloaded
    pub bvid: CollectionId,

    /// Directory under the output base the parts are written to
    pub output_dir: String,

    /// Whether finished parts are renamed to `{output_dir}-{part}.mp3`
    pub rename: bool,

    /// Current status
    pub status: TaskStatus,

    /// Overall progress (0.0 to 100.0)
    #[serde(default)]
    pub progress: f64,

    /// Local time of the last mutation
    #[schema(value_type = String)]
    pub last_update: NaiveDateTime,
}

/// How a task run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every part was skipped or downloaded
    Completed,
    /// The error ceiling was reached
    Failed,
    /// A stop was requested between parts
    Stopped,
}

/// Totals for a finished task run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskSummary {
    /// Task the summary belongs to
    pub task_id: TaskId,
    /// Planned parts
    pub total: u32,
    /// Parts downloaded in this run
    pub succeeded: u32,
    /// Parts already complete
    pub skipped: u32,
    /// Errors accumulated
    pub errors: u32,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Wall-clock duration in seconds
    pub elapsed_secs: f64,
}

impl TaskSummary {
    /// Status the task registry should persist for this run
    pub fn terminal_status(&self) -> TaskStatus {
        match self.outcome {
            RunOutcome::Completed => TaskStatus::Completed,
            RunOutcome::Failed => TaskStatus::Failed,
            RunOutcome::Stopped if self.succeeded + self.skipped > 0 => TaskStatus::SuccessPartial,
            RunOutcome::Stopped => TaskStatus::Failed,
        }
    }
}

/// Item of a task's event stream
#[derive(Clone, Debug, PartialEq)]
pub enum DownloadEvent {
    /// Per-part event
    Part(PartOutcome),
    /// Final item; nothing follows it
    Finished(TaskSummary),
}

/// A thumbnail variant as reported by the fetch tool
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    /// Image URL
    pub url: String,
}

/// Descriptive metadata of one part, resolved without downloading
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaInfo {
    /// Part title
    pub title: String,
    /// Duration in seconds
    pub duration: Option<f64>,
    /// Uploader name
    pub uploader: Option<String>,
    /// Upload date as `YYYYMMDD`
    pub upload_date: Option<String>,
    /// Preferred thumbnail URL
    pub thumbnail: Option<String>,
    /// All thumbnail variants, best last
    pub thumbnails: Vec<Thumbnail>,
    /// Canonical page URL
    pub webpage_url: Option<String>,
    /// Estimated download size
    pub filesize_approx: Option<u64>,
}
