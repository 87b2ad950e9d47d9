//! ID3 tag and cover embedding

use super::PendingTag;
use crate::error::CoverError;
use crate::utils::wait_for_file;
use async_trait::async_trait;
use id3::{Tag, TagLike, Version};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Writes tags (and cover art, when present) into a finished audio file
#[async_trait]
pub trait TagWriter: Send + Sync {
    /// Embed `item.tags` and `item.cover` into `item.path`
    async fn write_tags(&self, item: &PendingTag) -> Result<(), CoverError>;
}

/// ID3v2.3 tag writer
#[derive(Clone, Debug)]
pub struct Id3TagWriter {
    wait: Duration,
    poll: Duration,
}

impl Default for Id3TagWriter {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(10),
            poll: Duration::from_secs(1),
        }
    }
}

impl Id3TagWriter {
    /// Writer that waits up to `wait` for the file to appear, polling every `poll`
    pub fn new(wait: Duration, poll: Duration) -> Self {
        Self { wait, poll }
    }
}

#[async_trait]
impl TagWriter for Id3TagWriter {
    async fn write_tags(&self, item: &PendingTag) -> Result<(), CoverError> {
        if !wait_for_file(&item.path, self.wait, self.poll).await {
            return Err(CoverError::Embed {
                path: item.path.clone(),
                reason: "file not found".into(),
            });
        }

        let owned = item.clone();
        tokio::task::spawn_blocking(move || write_id3(&owned))
            .await
            .map_err(|e| CoverError::Embed {
                path: item.path.clone(),
                reason: format!("tag worker failed: {e}"),
            })??;

        info!(path = %item.path.display(), with_cover = item.cover.is_some(), "embedded tags");
        Ok(())
    }
}

fn write_id3(item: &PendingTag) -> Result<(), CoverError> {
    let embed_err = |reason: String| CoverError::Embed {
        path: item.path.clone(),
        reason,
    };

    let mut tag = read_or_new(&item.path).map_err(|e| embed_err(e.to_string()))?;
    let tags = &item.tags;

    tag.set_title(tags.title.as_str());
    tag.set_album(tags.album.as_str());
    if let Some(artist) = tags.artist.as_deref().filter(|a| !a.is_empty()) {
        tag.set_artist(artist);
        tag.set_album_artist(artist);
    }
    if let Some(year) = tags.year() {
        tag.set_year(year);
    }
    tag.set_track(tags.track);
    if tags.total_tracks > 0 {
        tag.set_total_tracks(tags.total_tracks);
    }

    if let Some(cover) = &item.cover {
        tag.remove_all_pictures();
        tag.add_frame(id3::frame::Picture {
            mime_type: "image/jpeg".to_string(),
            picture_type: id3::frame::PictureType::CoverFront,
            description: "Cover".to_string(),
            data: cover.clone(),
        });
    }

    tag.write_to_path(&item.path, Version::Id3v23)
        .map_err(|e| embed_err(e.to_string()))
}

fn read_or_new(path: &Path) -> id3::Result<Tag> {
    match Tag::read_from_path(path) {
        Ok(tag) => Ok(tag),
        Err(e) if matches!(e.kind, id3::ErrorKind::NoTag) => Ok(Tag::new()),
        Err(e) => Err(e),
    }
}
