//! Traits and types for fetching and transcoding part audio

use crate::config::DownloadConfig;
use crate::types::MediaInfo;
use crate::utils::with_suffix;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Where the fetcher should write a part
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Start a new file named after the part's title inside this directory
    Fresh(PathBuf),
    /// Keep writing into this existing (partial) audio file
    Continue(PathBuf),
}

/// Knobs passed through to the fetch tool
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Target audio bitrate (e.g. `192k`)
    pub audio_quality: String,
    /// Retries the tool performs internally
    pub retries: u32,
    /// Socket timeout of the network fetch
    pub socket_timeout: Duration,
    /// Fragments downloaded concurrently
    pub concurrent_fragments: u32,
}

impl From<&DownloadConfig> for FetchOptions {
    fn from(config: &DownloadConfig) -> Self {
        Self {
            audio_quality: config.audio_quality.clone(),
            retries: config.fetch_retries,
            socket_timeout: config.socket_timeout,
            concurrent_fragments: config.concurrent_fragments,
        }
    }
}

/// One fetch + transcode job
///
/// Built fresh for every attempt so options never leak between parts.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Part URL
    pub url: String,
    /// Output location
    pub target: OutputTarget,
    /// Tool options
    pub options: FetchOptions,
}

/// Progress reported while a fetch is running
#[derive(Debug, Clone, PartialEq)]
pub struct FetchProgress {
    /// Percent of the current part (0.0 to 100.0)
    pub percent: f64,
    /// Human-readable speed
    pub speed: Option<String>,
    /// Human-readable time left
    pub eta: Option<String>,
}

/// Result of a finished fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    /// Transcoded audio file the fetcher produced (may still be settling on disk)
    pub audio_path: PathBuf,
}

impl FetchedMedia {
    /// Audio path without its extension; transient siblings share this prefix
    pub fn output_base(&self) -> PathBuf {
        self.audio_path.with_extension("")
    }
}

/// Path prefix a fetch for `target` would write under, when it is known up front
pub fn known_output_base(target: &OutputTarget) -> Option<PathBuf> {
    match target {
        OutputTarget::Fresh(_) => None,
        OutputTarget::Continue(path) => Some(path.with_extension("")),
    }
}

/// Audio file for an output prefix
pub fn audio_path_for(base: &Path) -> PathBuf {
    with_suffix(base, ".mp3")
}

/// Capabilities of a fetcher implementation
#[derive(Debug, Clone, Copy)]
pub struct FetcherCapabilities {
    /// Can resolve part metadata without downloading
    pub can_probe: bool,
    /// Can download and transcode
    pub can_fetch: bool,
}

/// Fetches part metadata and audio
///
/// Implementations can drive an external tool, talk to the site directly,
/// or stand in for the real thing in tests.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Resolve a part's descriptive metadata without downloading it
    async fn probe(&self, url: &str) -> crate::Result<MediaInfo>;

    /// Download and transcode one part
    ///
    /// Progress is sent on `progress` while the fetch runs; a closed receiver
    /// is not an error.
    async fn fetch(
        &self,
        request: FetchRequest,
        progress: mpsc::Sender<FetchProgress>,
    ) -> crate::Result<FetchedMedia>;

    /// Query capabilities of this fetcher
    fn capabilities(&self) -> FetcherCapabilities;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
