//! One attempt at one part.

use super::context::{TaskContext, overall_progress};
use crate::error::{Error, PartError};
use crate::fetcher::{FetchOptions, FetchRequest, FetchedMedia, OutputTarget, known_output_base};
use crate::identity::Fingerprint;
use crate::ledger::Classification;
use crate::media::{PendingTag, TrackTags};
use crate::types::PartOutcome;
use crate::utils::{move_preserving, remove_artifacts, wait_for_file};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Progress updates buffered between the fetcher and the event stream
const PROGRESS_BUFFER: usize = 64;

/// A part that needs no further work in this run
#[derive(Debug)]
pub(super) enum PartDone {
    /// Already complete on disk
    Skipped(PathBuf),
    /// Downloaded and recorded in this run; tags are still pending
    Downloaded {
        path: PathBuf,
        pending: PendingTag,
    },
}

/// A failed attempt
#[derive(Debug)]
pub(super) struct PartFailure {
    pub(super) error: Error,
    /// Prefix of the attempt's transient artifacts, once known
    pub(super) output_base: Option<PathBuf>,
}

impl PartFailure {
    fn new(error: impl Into<Error>, output_base: Option<PathBuf>) -> Self {
        Self {
            error: error.into(),
            output_base,
        }
    }
}

fn fetch_failed(part: u32, error: Error) -> PartError {
    PartError::TransientFetch {
        part,
        reason: error.to_string(),
    }
}

/// Probe, classify, fetch, wait, rename and record part `part` of `total`
///
/// The cover is requested here but embedding is left to the caller, which
/// queues the returned [`PendingTag`] until every part is done.
pub(super) async fn process_part(
    ctx: &TaskContext,
    part: u32,
    total: u32,
) -> Result<PartDone, PartFailure> {
    let url = ctx.collaborators.planner.part_url(&ctx.collection, part);

    let info = ctx
        .collaborators
        .fetcher
        .probe(&url)
        .await
        .map_err(|e| PartFailure::new(fetch_failed(part, e), None))?;
    let fingerprint = Fingerprint::compute(&ctx.collection, part, &info.title);

    let target = match ctx.ledger.classify(&fingerprint).await {
        Classification::Complete(path) => {
            debug!(part, path = %path.display(), "part already complete");
            return Ok(PartDone::Skipped(path));
        }
        Classification::ResumablePartial(path) => {
            info!(part, path = %path.display(), "resuming partial file");
            OutputTarget::Continue(path)
        }
        Classification::NotStarted => OutputTarget::Fresh(ctx.base_path.clone()),
    };
    let known_base = known_output_base(&target);

    info!(part, title = %info.title, "downloading part");
    let request = FetchRequest {
        url,
        target,
        options: FetchOptions::from(&ctx.config.download),
    };
    let fetched = fetch_with_progress(ctx, part, total, request)
        .await
        .map_err(|e| PartFailure::new(fetch_failed(part, e), known_base))?;
    let output_base = fetched.output_base();

    let orchestrator = &ctx.config.orchestrator;
    if !wait_for_file(
        &fetched.audio_path,
        orchestrator.output_wait,
        orchestrator.poll_interval,
    )
    .await
    {
        return Err(PartFailure::new(
            PartError::OutputMissing {
                path: fetched.audio_path,
                waited_secs: orchestrator.output_wait.as_secs(),
            },
            Some(output_base),
        ));
    }

    let cover = match ctx.collaborators.covers.cover_for(&info).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!(part, error = %e, "cover art unavailable, tagging without it");
            None
        }
    };

    let path = if ctx.renames() {
        move_preserving(&fetched.audio_path, &ctx.canonical_path(part)).await
    } else {
        fetched.audio_path
    };

    ctx.ledger
        .record(fingerprint, &ctx.collection, part, &info, &path)
        .await
        .map_err(|e| PartFailure::new(e, Some(output_base.clone())))?;

    let removed = remove_artifacts(&output_base, &ctx.config.cleanup.success_suffixes).await;
    debug!(part, removed, "transient artifacts removed");

    Ok(PartDone::Downloaded {
        pending: PendingTag {
            path: path.clone(),
            tags: TrackTags::for_part(&info, &ctx.collection, part, total),
            cover,
        },
        path,
    })
}

/// Run the fetch while turning its progress reports into `progress` events
async fn fetch_with_progress(
    ctx: &TaskContext,
    part: u32,
    total: u32,
    request: FetchRequest,
) -> crate::Result<FetchedMedia> {
    let (progress_tx, mut progress_rx) = mpsc::channel(PROGRESS_BUFFER);
    let fetch = ctx.collaborators.fetcher.fetch(request, progress_tx);
    tokio::pin!(fetch);

    let forward = |p: crate::fetcher::FetchProgress| {
        PartOutcome::progress(part, overall_progress(part - 1, p.percent, total), p.speed, p.eta)
    };

    loop {
        tokio::select! {
            result = &mut fetch => {
                // reports sent right before the fetch returned
                while let Ok(p) = progress_rx.try_recv() {
                    ctx.emit(forward(p)).await;
                }
                return result;
            }
            Some(p) = progress_rx.recv() => ctx.emit(forward(p)).await,
        }
    }
}
