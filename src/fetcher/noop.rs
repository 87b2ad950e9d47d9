//! No-op fetcher for when yt-dlp is unavailable

use super::traits::{FetchProgress, FetchRequest, FetchedMedia, FetcherCapabilities, MediaFetcher};
use crate::types::MediaInfo;
use async_trait::async_trait;
use tokio::sync::mpsc;

const MISSING_TOOL: &str =
    "downloading requires the yt-dlp binary. Set YTDLP_PATH or ensure yt-dlp is in PATH.";

/// Fetcher used when no yt-dlp binary is available or configured
///
/// Every operation fails with `Error::ExternalTool`, which the orchestrator
/// reports as ordinary part errors. The server still starts, so the task
/// history and the part-count probe keep working.
///
/// # Examples
///
/// ```
/// use bili_archiver::fetcher::{MediaFetcher, NoOpFetcher};
///
/// # #[tokio::main]
/// # async fn main() {
/// let fetcher = NoOpFetcher;
/// assert!(fetcher.probe("https://www.bilibili.com/video/BV1xx411c7mD").await.is_err());
/// # }
/// ```
pub struct NoOpFetcher;

#[async_trait]
impl MediaFetcher for NoOpFetcher {
    async fn probe(&self, _url: &str) -> crate::Result<MediaInfo> {
        Err(crate::Error::ExternalTool(MISSING_TOOL.into()))
    }

    async fn fetch(
        &self,
        _request: FetchRequest,
        _progress: mpsc::Sender<FetchProgress>,
    ) -> crate::Result<FetchedMedia> {
        Err(crate::Error::ExternalTool(MISSING_TOOL.into()))
    }

    fn capabilities(&self) -> FetcherCapabilities {
        FetcherCapabilities {
            can_probe: false,
            can_fetch: false,
        }
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FetchOptions, OutputTarget};

    #[tokio::test]
    async fn fetch_reports_missing_tool() {
        let (tx, _rx) = mpsc::channel(1);
        let request = FetchRequest {
            url: "https://www.bilibili.com/video/BV1xx411c7mD?p=1".into(),
            target: OutputTarget::Fresh("/tmp".into()),
            options: FetchOptions::from(&crate::config::DownloadConfig::default()),
        };

        let result = NoOpFetcher.fetch(request, tx).await;
        assert!(matches!(result, Err(crate::Error::ExternalTool(_))));
    }

    #[test]
    fn reports_no_capabilities() {
        let caps = NoOpFetcher.capabilities();
        assert!(!caps.can_probe);
        assert!(!caps.can_fetch);
        assert_eq!(NoOpFetcher.name(), "noop");
    }
}
