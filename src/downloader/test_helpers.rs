//! Shared test helpers: in-memory collaborators and archiver construction.

use crate::config::Config;
use crate::downloader::{Archiver, Collaborators, DownloadRequest, TaskStream};
use crate::error::{CoverError, Error};
use crate::fetcher::{
    FetchProgress, FetchRequest, FetchedMedia, FetcherCapabilities, MediaFetcher, OutputTarget,
};
use crate::media::{CoverSource, PendingTag, TagWriter};
use crate::planner::PartPlanner;
use crate::types::{CollectionId, DownloadEvent, MediaInfo, PartOutcome, TaskSummary};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Notify, mpsc};

pub(crate) const COLLECTION: &str = "BV1xx411c7mD";

/// Bytes the fake fetcher writes for a complete part
pub(crate) const PART_SIZE: usize = 1000;

pub(crate) fn collection() -> CollectionId {
    CollectionId::parse(COLLECTION).unwrap()
}

pub(crate) fn title_of(part: u32) -> String {
    format!("Episode {part}")
}

/// Ordered log of collaborator calls shared by the fakes
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Pauses the fetch of one part until the test releases it
pub(crate) struct FetchGate {
    pub(crate) part: u32,
    pub(crate) reached: Arc<Notify>,
    pub(crate) release: Arc<Notify>,
}

/// Fetcher that writes real files into the target directory
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    journal: Journal,
    /// part -> attempts that still fail
    failures: Mutex<HashMap<u32, u32>>,
    always_fail: bool,
    skip_output: bool,
    leave_artifacts: bool,
    gate: Option<FetchGate>,
    fetches: Mutex<Vec<(u32, OutputTarget)>>,
}

impl ScriptedFetcher {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    /// Fail the first `times` fetches of `part`
    pub(crate) fn failing(self, part: u32, times: u32) -> Self {
        self.failures.lock().unwrap().insert(part, times);
        self
    }

    pub(crate) fn always_failing(mut self) -> Self {
        self.always_fail = true;
        self
    }

    /// Report success without producing the audio file
    pub(crate) fn without_output(mut self) -> Self {
        self.skip_output = true;
        self
    }

    /// Leave `.part`, `.webm` and `.info.json` siblings behind when an attempt goes wrong
    pub(crate) fn leaving_artifacts(mut self) -> Self {
        self.leave_artifacts = true;
        self
    }

    pub(crate) fn gated(mut self, gate: FetchGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Parts fetched so far, with their targets
    pub(crate) fn fetches(&self) -> Vec<(u32, OutputTarget)> {
        self.fetches.lock().unwrap().clone()
    }

    pub(crate) fn fetched_parts(&self) -> Vec<u32> {
        self.fetches().into_iter().map(|(part, _)| part).collect()
    }

    fn should_fail(&self, part: u32) -> bool {
        if self.always_fail {
            return true;
        }
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&part) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Transient siblings of `audio_path` a crashed fetch leaves on disk
pub(crate) const ARTIFACT_EXTENSIONS: [&str; 3] = ["part", "webm", "info.json"];

async fn write_artifacts(audio_path: &Path) -> std::io::Result<()> {
    for ext in ARTIFACT_EXTENSIONS {
        tokio::fs::write(audio_path.with_extension(ext), b"partial").await?;
    }
    Ok(())
}

fn part_of(url: &str) -> u32 {
    url.rsplit("p=").next().and_then(|p| p.parse().ok()).unwrap()
}

#[async_trait]
impl MediaFetcher for ScriptedFetcher {
    async fn probe(&self, url: &str) -> crate::Result<MediaInfo> {
        let part = part_of(url);
        Ok(MediaInfo {
            title: title_of(part),
            duration: Some(60.0),
            uploader: Some("Narrator".into()),
            upload_date: Some("20240131".into()),
            thumbnail: Some(format!("https://img.test/{part}.jpg")),
            ..Default::default()
        })
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        progress: mpsc::Sender<FetchProgress>,
    ) -> crate::Result<FetchedMedia> {
        let part = part_of(&request.url);
        self.journal.push(format!("fetch:{part}"));
        self.fetches
            .lock()
            .unwrap()
            .push((part, request.target.clone()));

        if let Some(gate) = self.gate.as_ref().filter(|g| g.part == part) {
            gate.reached.notify_one();
            gate.release.notified().await;
        }

        let audio_path = match &request.target {
            OutputTarget::Fresh(dir) => dir.join(format!("{}.mp3", title_of(part))),
            OutputTarget::Continue(path) => path.clone(),
        };

        if self.should_fail(part) {
            if self.leave_artifacts {
                write_artifacts(&audio_path).await?;
            }
            return Err(Error::ExternalTool(format!(
                "ERROR: [BiliBili] part {part}: HTTP Error 412"
            )));
        }

        let _ = progress
            .send(FetchProgress {
                percent: 50.0,
                speed: Some("1.00MiB/s".into()),
                eta: Some("00:01".into()),
            })
            .await;

        if !self.skip_output {
            tokio::fs::write(&audio_path, vec![0u8; PART_SIZE]).await?;
            tokio::fs::write(audio_path.with_extension("info.json"), b"{}").await?;
        } else if self.leave_artifacts {
            write_artifacts(&audio_path).await?;
        }

        let _ = progress
            .send(FetchProgress {
                percent: 100.0,
                speed: None,
                eta: None,
            })
            .await;

        Ok(FetchedMedia { audio_path })
    }

    fn capabilities(&self) -> FetcherCapabilities {
        FetcherCapabilities {
            can_probe: true,
            can_fetch: true,
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Planner with a fixed part count
pub(crate) struct FixedPlanner(pub(crate) u32);

#[async_trait]
impl PartPlanner for FixedPlanner {
    async fn plan(&self, _collection: &CollectionId) -> u32 {
        self.0
    }

    fn part_url(&self, collection: &CollectionId, part: u32) -> String {
        format!("https://video.test/{collection}?p={part}")
    }
}

/// Cover source returning the same bytes for every part (or nothing)
pub(crate) struct StaticCoverSource {
    journal: Journal,
    cover: Option<Vec<u8>>,
}

#[async_trait]
impl CoverSource for StaticCoverSource {
    async fn cover_for(&self, info: &MediaInfo) -> Result<Vec<u8>, CoverError> {
        self.journal.push(format!("cover:{}", info.title));
        self.cover.clone().ok_or(CoverError::NotAvailable)
    }
}

/// Tag writer that only records what it was asked to write
pub(crate) struct RecordingTagWriter {
    journal: Journal,
    written: Mutex<Vec<PendingTag>>,
}

impl RecordingTagWriter {
    pub(crate) fn written(&self) -> Vec<PendingTag> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl TagWriter for RecordingTagWriter {
    async fn write_tags(&self, item: &PendingTag) -> Result<(), CoverError> {
        let name = item
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.journal.push(format!("tag:{name}"));
        self.written.lock().unwrap().push(item.clone());
        Ok(())
    }
}

/// The fakes behind one test archiver
pub(crate) struct Fakes {
    pub(crate) journal: Journal,
    pub(crate) fetcher: Arc<ScriptedFetcher>,
    pub(crate) planner: Arc<FixedPlanner>,
    pub(crate) covers: Arc<StaticCoverSource>,
    pub(crate) tagger: Arc<RecordingTagWriter>,
}

impl Fakes {
    /// `parts` parts, a working fetcher and a cover for every part
    pub(crate) fn new(parts: u32) -> Self {
        Self::with_fetcher(parts, ScriptedFetcher::new)
    }

    /// Like [`Fakes::new`] with a customized fetcher
    pub(crate) fn with_fetcher(
        parts: u32,
        build: impl FnOnce(Journal) -> ScriptedFetcher,
    ) -> Self {
        let journal = Journal::default();
        Self {
            fetcher: Arc::new(build(journal.clone())),
            planner: Arc::new(FixedPlanner(parts)),
            covers: Arc::new(StaticCoverSource {
                journal: journal.clone(),
                cover: Some(vec![0xFF, 0xD8, 0xFF, 0xD9]),
            }),
            tagger: Arc::new(RecordingTagWriter {
                journal: journal.clone(),
                written: Mutex::new(Vec::new()),
            }),
            journal,
        }
    }

    pub(crate) fn without_covers(mut self) -> Self {
        self.covers = Arc::new(StaticCoverSource {
            journal: self.journal.clone(),
            cover: None,
        });
        self
    }

    pub(crate) fn collaborators(&self) -> Collaborators {
        Collaborators {
            fetcher: self.fetcher.clone(),
            planner: self.planner.clone(),
            covers: self.covers.clone(),
            tagger: self.tagger.clone(),
        }
    }
}

/// Config rooted in `root` with millisecond backoff and waits
pub(crate) fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.download.output_base_dir = root.join("Audiobooks");
    config.persistence.ledger_path = root.join("download_history").join("history.json");
    config.persistence.task_history_path = root.join("download_tasks").join("download_history.json");
    config.orchestrator.backoff_step = Duration::from_millis(1);
    config.orchestrator.output_wait = Duration::from_millis(50);
    config.orchestrator.poll_interval = Duration::from_millis(5);
    config.tools.search_path = false;
    config
}

/// Archiver over `fakes` whose state lives in `root`
pub(crate) async fn archiver_in(root: &Path, fakes: &Fakes) -> Archiver {
    Archiver::with_collaborators(test_config(root), fakes.collaborators())
        .await
        .unwrap()
}

/// Helper to create a test Archiver in a fresh temp dir.
/// Returns the archiver and the tempdir (which must be kept alive).
pub(crate) async fn create_test_archiver(fakes: &Fakes) -> (Archiver, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let archiver = archiver_in(temp_dir.path(), fakes).await;
    (archiver, temp_dir)
}

pub(crate) fn request(output_dir: &str, rename: bool) -> DownloadRequest {
    DownloadRequest {
        collection: collection(),
        output_dir: output_dir.to_string(),
        rename,
    }
}

/// Drive a stream to its end; returns the part events and the summary
pub(crate) async fn collect(stream: TaskStream) -> (Vec<PartOutcome>, TaskSummary) {
    let events: Vec<DownloadEvent> = stream.collect().await;
    let mut outcomes = Vec::new();
    let mut summary = None;
    for event in events {
        assert!(summary.is_none(), "event after the summary");
        match event {
            DownloadEvent::Part(outcome) => outcomes.push(outcome),
            DownloadEvent::Finished(s) => summary = Some(s),
        }
    }
    (outcomes, summary.expect("stream ended without a summary"))
}

/// Events other than in-flight progress
pub(crate) fn milestones(outcomes: &[PartOutcome]) -> Vec<&PartOutcome> {
    outcomes
        .iter()
        .filter(|o| o.status != crate::types::OutcomeStatus::Progress)
        .collect()
}

/// `{root}/Audiobooks/{output_dir}`
pub(crate) fn task_dir(root: &Path, output_dir: &str) -> PathBuf {
    root.join("Audiobooks").join(output_dir)
}
