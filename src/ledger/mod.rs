//! Completion ledger
//!
//! Persistent map from [`Fingerprint`] to the last known facts about a
//! finished part. It is the source of truth for "already downloaded": a part
//! whose file is still on disk at (at least) its recorded size is skipped.
//!
//! Every read-modify-write happens behind one async mutex and every mutation
//! is persisted immediately, so concurrent tasks never lose each other's
//! entries. Persistence failures are logged and the in-memory state carries on.

use crate::error::{LedgerError, PartError};
use crate::identity::Fingerprint;
use crate::types::{CollectionId, MediaInfo};
use crate::utils::write_json_atomic;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Stored facts about one finished part
///
/// Field names on disk match the history files written by earlier releases.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Collection the part belongs to
    #[serde(rename = "bvid")]
    pub collection_id: CollectionId,

    /// 1-based part index
    #[serde(rename = "p")]
    pub part_index: u32,

    /// Part title at the time it was recorded
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    /// Where the finished file lives
    pub file_path: PathBuf,

    /// Local time the entry was written
    #[serde(rename = "download_time")]
    pub recorded_at: NaiveDateTime,

    /// On-disk size when the entry was written
    #[serde(rename = "file_size", default, deserialize_with = "null_as_default")]
    pub recorded_size_bytes: u64,

    /// Duration in seconds
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: f64,

    /// Uploader name
    #[serde(rename = "uploader", default, deserialize_with = "null_as_default")]
    pub publisher: String,

    /// Upload date as `YYYYMMDD`
    #[serde(rename = "upload_date", default, deserialize_with = "null_as_default")]
    pub publish_date: String,
}

/// Older history files store `null` where the fetch tool reported nothing
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Result of checking a fingerprint against the ledger and the disk
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// File exists at or above its recorded size
    Complete(PathBuf),
    /// File exists but is smaller than recorded; continue writing at this path
    ResumablePartial(PathBuf),
    /// No usable entry
    NotStarted,
}

type Entries = BTreeMap<Fingerprint, LedgerEntry>;

/// The completion ledger
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Mutex<Entries>,
}

impl Ledger {
    /// Load the ledger from `path`
    ///
    /// A missing file yields an empty ledger. Entries that cannot be decoded
    /// are skipped and the rest are kept. A file that cannot be decoded at all
    /// is moved aside to `{path}.corrupt` before the ledger starts empty, and a
    /// file with skipped entries is copied there, so the next write never
    /// destroys records that could still be recovered by hand.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path).await {
            Ok(entries) => {
                info!(path = %path.display(), entries = entries.len(), "loaded ledger");
                entries
            }
            Err(e) => {
                error!(error = %e, "starting with an empty ledger");
                Entries::new()
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Ledger file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether the ledger has no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Stored entry for `fingerprint`, if its file still exists
    ///
    /// An entry whose file is gone is purged and the ledger persisted before
    /// `None` is returned.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Option<LedgerEntry> {
        let mut entries = self.entries.lock().await;
        self.live_entry(&mut entries, fingerprint)
            .await
            .map(|(entry, _)| entry)
    }

    /// Decide whether a part is complete, resumable or not started
    pub async fn classify(&self, fingerprint: &Fingerprint) -> Classification {
        let mut entries = self.entries.lock().await;
        match self.live_entry(&mut entries, fingerprint).await {
            None => Classification::NotStarted,
            Some((entry, actual)) if actual >= entry.recorded_size_bytes => {
                debug!(path = %entry.file_path.display(), "found complete ledger entry");
                Classification::Complete(entry.file_path)
            }
            Some((entry, actual)) => {
                info!(
                    path = %entry.file_path.display(),
                    actual,
                    recorded = entry.recorded_size_bytes,
                    "found incomplete file, will resume"
                );
                Classification::ResumablePartial(entry.file_path)
            }
        }
    }

    /// Write or overwrite the entry for a finished part
    ///
    /// The recorded size is read from disk, never supplied by the caller. A
    /// file that cannot be inspected is not recorded.
    pub async fn record(
        &self,
        fingerprint: Fingerprint,
        collection: &CollectionId,
        part: u32,
        info: &MediaInfo,
        file_path: &Path,
    ) -> std::result::Result<LedgerEntry, PartError> {
        let metadata =
            tokio::fs::metadata(file_path)
                .await
                .map_err(|e| PartError::Unrecordable {
                    path: file_path.to_path_buf(),
                    reason: e.to_string(),
                })?;

        let entry = LedgerEntry {
            collection_id: collection.clone(),
            part_index: part,
            title: info.title.clone(),
            file_path: file_path.to_path_buf(),
            recorded_at: chrono::Local::now().naive_local(),
            recorded_size_bytes: metadata.len(),
            duration: info.duration.unwrap_or_default(),
            publisher: info.uploader.clone().unwrap_or_default(),
            publish_date: info.upload_date.clone().unwrap_or_default(),
        };

        let mut entries = self.entries.lock().await;
        entries.insert(fingerprint, entry.clone());
        self.persist_logged(&entries).await;
        info!(title = %entry.title, part, size = entry.recorded_size_bytes, "recorded part");

        Ok(entry)
    }

    async fn live_entry(
        &self,
        entries: &mut Entries,
        fingerprint: &Fingerprint,
    ) -> Option<(LedgerEntry, u64)> {
        let entry = entries.get(fingerprint)?.clone();
        match tokio::fs::metadata(&entry.file_path).await {
            Ok(meta) if meta.is_file() => Some((entry, meta.len())),
            _ => {
                info!(
                    path = %entry.file_path.display(),
                    "recorded file no longer exists, purging entry"
                );
                entries.remove(fingerprint);
                self.persist_logged(entries).await;
                None
            }
        }
    }

    async fn persist_logged(&self, entries: &Entries) {
        if let Err(e) = self.persist(entries).await {
            error!(error = %e, "ledger change kept in memory only");
        }
    }

    async fn persist(&self, entries: &Entries) -> std::result::Result<(), LedgerError> {
        write_json_atomic(&self.path, entries)
            .await
            .map_err(|e| LedgerError::Persist {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }
}

async fn read_entries(path: &Path) -> std::result::Result<Entries, LedgerError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
        Err(e) => {
            return Err(LedgerError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    let raw: BTreeMap<Fingerprint, serde_json::Value> = match serde_json::from_slice(&bytes) {
        Ok(raw) => raw,
        Err(e) => {
            set_aside(path, SetAside::Move).await;
            return Err(LedgerError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    let mut entries = Entries::new();
    let mut skipped = 0;
    for (fingerprint, value) in raw {
        match serde_json::from_value::<LedgerEntry>(value) {
            Ok(entry) => {
                entries.insert(fingerprint, entry);
            }
            Err(e) => {
                warn!(%fingerprint, error = %e, "skipping undecodable ledger entry");
                skipped += 1;
            }
        }
    }
    if skipped > 0 {
        set_aside(path, SetAside::Copy).await;
    }

    Ok(entries)
}

enum SetAside {
    Move,
    Copy,
}

/// Keep the ledger file as it was at `{path}.corrupt`
async fn set_aside(path: &Path, how: SetAside) {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".corrupt");
    let backup = PathBuf::from(backup);

    let result = match how {
        SetAside::Move => tokio::fs::rename(path, &backup).await,
        SetAside::Copy => tokio::fs::copy(path, &backup).await.map(|_| ()),
    };
    match result {
        Ok(()) => warn!(backup = %backup.display(), "kept a copy of the unreadable ledger"),
        Err(e) => error!(backup = %backup.display(), error = %e, "could not keep a copy of the unreadable ledger"),
    }
}
