//! yt-dlp backed fetcher

use super::parser::{OutputLine, output_template, parse_line, progress_template};
use super::traits::{
    FetchProgress, FetchRequest, FetchedMedia, FetcherCapabilities, MediaFetcher, OutputTarget,
    audio_path_for, known_output_base,
};
use crate::error::{Error, Result};
use crate::types::MediaInfo;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

/// Lines of output kept for error messages
const TAIL_LINES: usize = 8;

/// Fetcher driving the external `yt-dlp` binary
///
/// Transcoding to mp3 is delegated to yt-dlp's ffmpeg post-processor, so
/// `ffmpeg` must be reachable by yt-dlp as well.
///
/// # Examples
///
/// ```no_run
/// use bili_archiver::fetcher::{MediaFetcher, YtDlpFetcher};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = YtDlpFetcher::from_path().expect("yt-dlp not found in PATH");
/// let info = fetcher.probe("https://www.bilibili.com/video/BV1xx411c7mD?p=1").await?;
/// println!("{}", info.title);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary_path: PathBuf,
}

impl YtDlpFetcher {
    /// Create a fetcher with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Arguments for a fetch, built from scratch for every request
    pub(crate) fn fetch_args(request: &FetchRequest) -> Vec<String> {
        let template = match &request.target {
            OutputTarget::Fresh(dir) => dir.join("%(title)s.%(ext)s"),
            OutputTarget::Continue(path) => {
                PathBuf::from(format!("{}.%(ext)s", path.with_extension("").display()))
            }
        };
        let options = &request.options;

        vec![
            "--format".into(),
            "bestaudio/best".into(),
            "--extract-audio".into(),
            "--audio-format".into(),
            "mp3".into(),
            "--audio-quality".into(),
            options.audio_quality.clone(),
            "--output".into(),
            template.display().to_string(),
            "--continue".into(),
            "--no-playlist".into(),
            "--no-warnings".into(),
            "--no-colors".into(),
            "--newline".into(),
            "--retries".into(),
            options.retries.to_string(),
            "--socket-timeout".into(),
            options.socket_timeout.as_secs().max(1).to_string(),
            "--concurrent-fragments".into(),
            options.concurrent_fragments.max(1).to_string(),
            "--progress".into(),
            "--progress-template".into(),
            progress_template(),
            "--print".into(),
            output_template(),
            request.url.clone(),
        ]
    }
}

#[derive(Debug, Default)]
struct OutputScan {
    final_path: Option<PathBuf>,
    tail: VecDeque<String>,
}

async fn scan_output<R>(reader: Option<R>, progress: mpsc::Sender<FetchProgress>) -> OutputScan
where
    R: AsyncRead + Unpin,
{
    let mut scan = OutputScan::default();
    let Some(reader) = reader else {
        return scan;
    };

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_line(&line) {
            Some(OutputLine::Progress(p)) => {
                // receiver may be gone; the fetch itself carries on
                let _ = progress.try_send(p);
            }
            Some(OutputLine::FinalPath(path)) => scan.final_path = Some(path),
            None => {
                debug!(line = %line, "yt-dlp");
                if scan.tail.len() == TAIL_LINES {
                    scan.tail.pop_front();
                }
                scan.tail.push_back(line);
            }
        }
    }
    scan
}

fn tail_message(scan: &OutputScan) -> String {
    scan.tail
        .iter()
        .rev()
        .find(|l| l.contains("ERROR"))
        .or_else(|| scan.tail.back())
        .cloned()
        .unwrap_or_default()
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn probe(&self, url: &str) -> Result<MediaInfo> {
        let output = Command::new(&self.binary_path)
            .args(["--dump-single-json", "--skip-download", "--no-playlist", "--no-warnings"])
            .arg(url)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("failed to execute yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExternalTool(format!(
                "yt-dlp probe exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        progress: mpsc::Sender<FetchProgress>,
    ) -> Result<FetchedMedia> {
        let args = Self::fetch_args(&request);
        debug!(binary = %self.binary_path.display(), ?args, "starting yt-dlp");

        let mut child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("failed to execute yt-dlp: {e}")))?;

        let stdout_scan = tokio::spawn(scan_output(child.stdout.take(), progress.clone()));
        let stderr_scan = tokio::spawn(scan_output(child.stderr.take(), progress));

        let status = child.wait().await?;
        let stdout = stdout_scan
            .await
            .map_err(|e| Error::Other(format!("yt-dlp output reader failed: {e}")))?;
        let stderr = stderr_scan
            .await
            .map_err(|e| Error::Other(format!("yt-dlp output reader failed: {e}")))?;

        if !status.success() {
            let mut reason = tail_message(&stderr);
            if reason.is_empty() {
                reason = tail_message(&stdout);
            }
            return Err(Error::ExternalTool(format!("yt-dlp exited with {status}: {reason}")));
        }

        let audio_path = stdout
            .final_path
            .or(stderr.final_path)
            .map(|p| normalize_audio_path(&p))
            .or_else(|| known_output_base(&request.target).map(|b| audio_path_for(&b)))
            .ok_or_else(|| {
                Error::ExternalTool("yt-dlp finished without reporting an output file".into())
            })?;

        Ok(FetchedMedia { audio_path })
    }

    fn capabilities(&self) -> FetcherCapabilities {
        FetcherCapabilities {
            can_probe: true,
            can_fetch: true,
        }
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// The reported path may still carry the source container's extension
fn normalize_audio_path(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("mp3")) {
        path.to_path_buf()
    } else {
        path.with_extension("mp3")
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchOptions;
    use std::time::Duration;

    fn request(target: OutputTarget) -> FetchRequest {
        FetchRequest {
            url: "https://www.bilibili.com/video/BV1xx411c7mD?p=2".into(),
            target,
            options: FetchOptions {
                audio_quality: "192k".into(),
                retries: 3,
                socket_timeout: Duration::from_secs(30),
                concurrent_fragments: 5,
            },
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let idx = args.iter().position(|a| a == flag).unwrap();
        &args[idx + 1]
    }

    #[test]
    fn fresh_fetch_names_file_after_title() {
        let args = YtDlpFetcher::fetch_args(&request(OutputTarget::Fresh("/books/novel".into())));

        assert_eq!(value_after(&args, "--output"), "/books/novel/%(title)s.%(ext)s");
        assert_eq!(value_after(&args, "--audio-format"), "mp3");
        assert_eq!(value_after(&args, "--audio-quality"), "192k");
        assert_eq!(value_after(&args, "--retries"), "3");
        assert_eq!(value_after(&args, "--socket-timeout"), "30");
        assert_eq!(value_after(&args, "--concurrent-fragments"), "5");
        assert!(args.contains(&"--continue".to_string()));
        assert_eq!(args.last().unwrap(), "https://www.bilibili.com/video/BV1xx411c7mD?p=2");
    }

    #[test]
    fn continue_fetch_reuses_existing_name() {
        let args = YtDlpFetcher::fetch_args(&request(OutputTarget::Continue(
            "/books/novel/novel-2.mp3".into(),
        )));

        assert_eq!(value_after(&args, "--output"), "/books/novel/novel-2.%(ext)s");
    }

    #[test]
    fn requests_are_independent() {
        let resumed = YtDlpFetcher::fetch_args(&request(OutputTarget::Continue(
            "/books/novel/old.mp3".into(),
        )));
        let fresh = YtDlpFetcher::fetch_args(&request(OutputTarget::Fresh("/books/novel".into())));

        assert_ne!(value_after(&resumed, "--output"), value_after(&fresh, "--output"));
    }

    #[test]
    fn normalizes_reported_extension() {
        assert_eq!(
            normalize_audio_path(Path::new("/b/Ep 1.m4a")),
            PathBuf::from("/b/Ep 1.mp3")
        );
        assert_eq!(
            normalize_audio_path(Path::new("/b/Ep 1.MP3")),
            PathBuf::from("/b/Ep 1.MP3")
        );
    }

    #[tokio::test]
    async fn scan_output_forwards_progress_and_keeps_path() {
        let text = "[BiliBili] Extracting\n\
                    [bili-progress] 10.0%|1MiB/s|00:09\n\
                    [bili-progress] 100.0%|1MiB/s|00:00\n\
                    [bili-output] /b/Ep 1.mp3\n";
        let (tx, mut rx) = mpsc::channel(16);

        let scan = scan_output(Some(text.as_bytes()), tx).await;

        assert_eq!(scan.final_path, Some(PathBuf::from("/b/Ep 1.mp3")));
        assert_eq!(rx.recv().await.unwrap().percent, 10.0);
        assert_eq!(rx.recv().await.unwrap().percent, 100.0);
        assert_eq!(scan.tail.len(), 1);
    }

    #[test]
    fn tail_message_prefers_error_lines() {
        let scan = OutputScan {
            final_path: None,
            tail: VecDeque::from(vec![
                "ERROR: [BiliBili] 412 Precondition Failed".to_string(),
                "some trailing noise".to_string(),
            ]),
        };
        assert_eq!(tail_message(&scan), "ERROR: [BiliBili] 412 Precondition Failed");
    }

    #[tokio::test]
    async fn missing_binary_is_external_tool_error() {
        let fetcher = YtDlpFetcher::new(PathBuf::from("/nonexistent/yt-dlp-binary-xyz"));
        let err = fetcher.probe("https://example.invalid").await.unwrap_err();
        assert!(matches!(err, Error::ExternalTool(_)));
    }

    #[test]
    fn from_path_consistent_with_which() {
        assert_eq!(which::which("yt-dlp").is_ok(), YtDlpFetcher::from_path().is_some());
    }
}
