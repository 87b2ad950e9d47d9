//! Configuration types for bili-archiver

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};
use utoipa::ToSchema;

/// Fetch behavior configuration (directories, transcoding, yt-dlp knobs)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DownloadConfig {
    /// Base directory that task output directories live under (default: "Audiobooks")
    #[serde(default = "default_output_base_dir")]
    pub output_base_dir: PathBuf,

    /// Target audio bitrate handed to the transcoder (default: "192k")
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,

    /// Retries the fetch tool performs internally for a single part (default: 3)
    ///
    /// This is independent of the orchestrator's per-task error ceiling.
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    /// Socket timeout for the underlying network fetch (default: 30 seconds)
    #[serde(default = "default_socket_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub socket_timeout: Duration,

    /// Concurrent fragment downloads within one part (default: 5)
    #[serde(default = "default_concurrent_fragments")]
    pub concurrent_fragments: u32,

    /// Video page base URL; a collection id is appended (default: "https://www.bilibili.com/video/")
    #[serde(default = "default_site_base_url")]
    pub site_base_url: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_base_dir: default_output_base_dir(),
            audio_quality: default_audio_quality(),
            fetch_retries: default_fetch_retries(),
            socket_timeout: default_socket_timeout(),
            concurrent_fragments: default_concurrent_fragments(),
            site_base_url: default_site_base_url(),
        }
    }
}

/// Per-task orchestration limits
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct OrchestratorConfig {
    /// Errors a task may accumulate before it is marked failed (default: 5)
    #[serde(default = "default_error_ceiling")]
    pub error_ceiling: u32,

    /// Backoff unit; the n-th error sleeps `n × backoff_step` (default: 5 seconds)
    #[serde(default = "default_backoff_step", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub backoff_step: Duration,

    /// How long to wait for the transcoded file to become readable (default: 30 seconds)
    #[serde(default = "default_output_wait", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub output_wait: Duration,

    /// Poll interval while waiting for output files (default: 1 second)
    #[serde(default = "default_poll_interval", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub poll_interval: Duration,

    /// Rename finished files to `{output_dir}-{part}.mp3` when requested (default: true)
    #[serde(default = "default_true")]
    pub allow_rename: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            error_ceiling: default_error_ceiling(),
            backoff_step: default_backoff_step(),
            output_wait: default_output_wait(),
            poll_interval: default_poll_interval(),
            allow_rename: true,
        }
    }
}

/// Where persisted state lives
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Completion ledger file (default: "download_history/history.json")
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,

    /// Task history file (default: "download_tasks/download_history.json")
    #[serde(default = "default_task_history_path")]
    pub task_history_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
            task_history_path: default_task_history_path(),
        }
    }
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ToolsConfig {
    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for yt-dlp if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            search_path: true,
        }
    }
}

/// Transient artifacts removed next to a part's output
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CleanupConfig {
    /// Suffixes removed after a part succeeds
    #[serde(default = "default_success_suffixes")]
    pub success_suffixes: Vec<String>,

    /// Suffixes removed after a part attempt fails
    #[serde(default = "default_failure_suffixes")]
    pub failure_suffixes: Vec<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            success_suffixes: default_success_suffixes(),
            failure_suffixes: default_failure_suffixes(),
        }
    }
}

/// Retry configuration for best-effort network calls (cover art)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to retry delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:5000)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
        }
    }
}

/// Main configuration for [`Archiver`](crate::Archiver)
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Fetch and transcode settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Per-task orchestration limits
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Ledger and task history locations
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Transient artifact cleanup
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Backoff for best-effort network calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Build a configuration from environment variables, falling back to defaults.
    ///
    /// | Variable               | Field                              |
    /// |------------------------|------------------------------------|
    /// | `DOWNLOAD_DIR`         | `download.output_base_dir`         |
    /// | `MAX_RETRIES`          | `download.fetch_retries`           |
    /// | `TIMEOUT`              | `download.socket_timeout` (secs)   |
    /// | `CONCURRENT_DOWNLOADS` | `download.concurrent_fragments`    |
    /// | `AUDIO_QUALITY`        | `download.audio_quality`           |
    /// | `BIND_ADDRESS`         | `api.bind_address`                 |
    /// | `LEDGER_PATH`          | `persistence.ledger_path`          |
    /// | `TASK_HISTORY_PATH`    | `persistence.task_history_path`    |
    /// | `YTDLP_PATH`           | `tools.ytdlp_path`                 |
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(dir) = env_var("DOWNLOAD_DIR") {
            config.download.output_base_dir = PathBuf::from(dir);
        }
        if let Some(retries) = env_parse::<u32>("MAX_RETRIES")? {
            config.download.fetch_retries = retries;
        }
        if let Some(secs) = env_parse::<u64>("TIMEOUT")? {
            config.download.socket_timeout = Duration::from_secs(secs);
        }
        if let Some(fragments) = env_parse::<u32>("CONCURRENT_DOWNLOADS")? {
            config.download.concurrent_fragments = fragments;
        }
        if let Some(quality) = env_var("AUDIO_QUALITY") {
            config.download.audio_quality = quality;
        }
        if let Some(addr) = env_parse::<SocketAddr>("BIND_ADDRESS")? {
            config.api.bind_address = addr;
        }
        if let Some(path) = env_var("LEDGER_PATH") {
            config.persistence.ledger_path = PathBuf::from(path);
        }
        if let Some(path) = env_var("TASK_HISTORY_PATH") {
            config.persistence.task_history_path = PathBuf::from(path);
        }
        if let Some(path) = env_var("YTDLP_PATH") {
            config.tools.ytdlp_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    /// Directory a task with the given output directory name writes into
    pub fn task_output_dir(&self, output_dir: &str) -> PathBuf {
        self.download.output_base_dir.join(output_dir)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| Error::Config {
            message: format!("invalid value {raw:?} for {key}: {e}"),
            key: Some(key.to_string()),
        }),
    }
}

fn default_true() -> bool {
    true
}

fn default_output_base_dir() -> PathBuf {
    PathBuf::from("Audiobooks")
}

fn default_audio_quality() -> String {
    "192k".to_string()
}

fn default_fetch_retries() -> u32 {
    3
}

fn default_socket_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_concurrent_fragments() -> u32 {
    5
}

fn default_site_base_url() -> String {
    "https://www.bilibili.com/video/".to_string()
}

fn default_error_ceiling() -> u32 {
    5
}

fn default_backoff_step() -> Duration {
    Duration::from_secs(5)
}

fn default_output_wait() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("download_history").join("history.json")
}

fn default_task_history_path() -> PathBuf {
    PathBuf::from("download_tasks").join("download_history.json")
}

fn default_success_suffixes() -> Vec<String> {
    vec![
        ".info.json".into(),
        ".m4a".into(),
        ".webm".into(),
        ".part".into(),
        ".ytdl".into(),
    ]
}

fn default_failure_suffixes() -> Vec<String> {
    vec![
        ".mp3".into(),
        ".m4a".into(),
        ".webm".into(),
        ".part".into(),
        ".ytdl".into(),
        ".info.json".into(),
    ]
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
