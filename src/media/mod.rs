//! Cover art and metadata tags
//!
//! Both concerns are best-effort: failures are logged by the orchestrator
//! and never fail a part.

mod cover;
mod tags;

pub use cover::{COVER_SIZE, CoverSource, HttpCoverSource, normalize_cover, scrape_cover_url};
pub use tags::{Id3TagWriter, TagWriter};

use crate::types::{CollectionId, MediaInfo};
use std::path::PathBuf;

/// Text tags written into a finished part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackTags {
    /// Part title
    pub title: String,
    /// Uploader
    pub artist: Option<String>,
    /// Collection the part belongs to
    pub album: String,
    /// Upload date as `YYYYMMDD`
    pub date: Option<String>,
    /// 1-based part index
    pub track: u32,
    /// Parts in the collection
    pub total_tracks: u32,
}

impl TrackTags {
    /// Tags for part `track` of `total_tracks` in `collection`
    pub fn for_part(
        info: &MediaInfo,
        collection: &CollectionId,
        track: u32,
        total_tracks: u32,
    ) -> Self {
        Self {
            title: info.title.clone(),
            artist: info.uploader.clone(),
            album: collection.to_string(),
            date: info.upload_date.clone(),
            track,
            total_tracks,
        }
    }

    /// Year from a `YYYYMMDD` date
    pub fn year(&self) -> Option<i32> {
        self.date.as_deref()?.get(..4)?.parse().ok()
    }
}

/// A finished part waiting for its tags
///
/// Queued by the orchestrator and drained in FIFO order once the task's
/// part loop ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTag {
    /// Final location of the audio file
    pub path: PathBuf,
    /// Text tags
    pub tags: TrackTags,
    /// Normalized JPEG cover, if one could be fetched
    pub cover: Option<Vec<u8>>,
}
