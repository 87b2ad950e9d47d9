//! # bili-archiver
//!
//! Resumable multi-part audio archiver for Bilibili collections.
//!
//! A collection (one `BV…` id with `p=1..N` parts) is downloaded part by part
//! through yt-dlp. Every finished part is recorded in a completion ledger keyed
//! by a content fingerprint, so a re-run skips what is already on disk and
//! continues partial files in place. Cover art and ID3 tags are written once
//! the last part has been fetched.
//!
//! ## Design Philosophy
//!
//! - **Resumable** - An interrupted run picks up where it stopped
//! - **Pluggable** - Fetcher, planner, cover source and tag writer are traits
//! - **Stream-driven** - A download is a lazy stream of part events
//! - **Sensible defaults** - Works out of the box with zero configuration
//!
//! ## Quick Start
//!
//! ```no_run
//! use bili_archiver::{Archiver, CollectionId, Config, DownloadEvent, DownloadRequest};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let archiver = Archiver::new(Config::default()).await?;
//!
//!     let mut events = archiver
//!         .start_download(DownloadRequest {
//!             collection: CollectionId::parse("https://www.bilibili.com/video/BV1xx411c7mD")?,
//!             output_dir: "Lectures".to_string(),
//!             rename: true,
//!         })
//!         .await?;
//!
//!     while let Some(event) = events.next().await {
//!         match event {
//!             DownloadEvent::Part(outcome) => println!("{outcome:?}"),
//!             DownloadEvent::Finished(summary) => println!("done: {summary:?}"),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Core archiver implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Media fetching (yt-dlp)
pub mod fetcher;
/// Content fingerprints
pub mod identity;
/// Completion ledger
pub mod ledger;
/// Cover art and tagging
pub mod media;
/// Part counting
pub mod planner;
/// Persisted task history
pub mod registry;
/// Retry logic and the per-task error budget
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use downloader::{Archiver, Collaborators, DownloadRequest, TaskStream};
pub use error::{
    ApiError, CoverError, Error, ErrorDetail, LedgerError, PartError, Result, ToHttpStatus,
};
pub use fetcher::{MediaFetcher, NoOpFetcher, YtDlpFetcher};
pub use media::{CoverSource, HttpCoverSource, Id3TagWriter, TagWriter};
pub use planner::{PageCountPlanner, PartPlanner};
pub use types::{
    CollectionId, DownloadEvent, OutcomeStatus, PartOutcome, RunOutcome, Task, TaskId,
    TaskStatus, TaskSummary,
};

/// Resolves once the process is asked to terminate.
///
/// Pass it to [`api::start_api_server`] for graceful shutdown.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use bili_archiver::{Archiver, Config, shutdown_signal};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Arc::new(Config::default());
///     let archiver = Arc::new(Archiver::new((*config).clone()).await?);
///     bili_archiver::api::start_api_server(archiver, config, shutdown_signal()).await?;
///     Ok(())
/// }
/// ```
pub async fn shutdown_signal() {
    wait_for_signal().await;
    tracing::info!("shutdown signal received, stopping");
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
