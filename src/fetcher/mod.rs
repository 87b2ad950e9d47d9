//! Part fetching and transcoding
//!
//! The orchestrator talks to the fetch tool only through the [`MediaFetcher`]
//! trait. Two implementations ship with the crate:
//!
//! - [`YtDlpFetcher`]: drives the external `yt-dlp` binary
//! - [`NoOpFetcher`]: stand-in when no binary is available
//!
//! [`fetcher_from_config`] picks one based on [`ToolsConfig`].

mod noop;
mod parser;
mod traits;
mod ytdlp;

pub use noop::NoOpFetcher;
pub use traits::{
    FetchOptions, FetchProgress, FetchRequest, FetchedMedia, FetcherCapabilities, MediaFetcher,
    OutputTarget, audio_path_for, known_output_base,
};
pub use ytdlp::YtDlpFetcher;

use crate::config::ToolsConfig;
use std::sync::Arc;

/// Select a fetcher: explicit path, then PATH search, then [`NoOpFetcher`]
pub fn fetcher_from_config(tools: &ToolsConfig) -> Arc<dyn MediaFetcher> {
    let fetcher: Arc<dyn MediaFetcher> = if let Some(ref path) = tools.ytdlp_path {
        Arc::new(YtDlpFetcher::new(path.clone()))
    } else if tools.search_path {
        YtDlpFetcher::from_path()
            .map(|f| Arc::new(f) as Arc<dyn MediaFetcher>)
            .unwrap_or_else(|| Arc::new(NoOpFetcher))
    } else {
        Arc::new(NoOpFetcher)
    };

    let caps = fetcher.capabilities();
    tracing::info!(
        fetcher = fetcher.name(),
        can_probe = caps.can_probe,
        can_fetch = caps.can_fetch,
        "media fetcher initialized"
    );
    if !caps.can_fetch {
        tracing::warn!("yt-dlp not found; every part will fail until it is installed");
    }

    fetcher
}
