//! Utility functions for file operations and path manipulation

use crate::error::{Error, Result};
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const SITE_ORIGIN: &str = "https://www.bilibili.com";

/// HTTP client that presents itself like a desktop browser visiting the site
///
/// The video site rejects page and image requests that lack a browser user
/// agent or a same-site referer.
pub fn browser_client(timeout: Duration) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(header::REFERER, HeaderValue::from_static(SITE_ORIGIN));
    headers.insert(header::ORIGIN, HeaderValue::from_static(SITE_ORIGIN));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Other(format!("failed to create HTTP client: {e}")))
}

/// Append a suffix to a path without touching its existing extension
///
/// ```
/// use bili_archiver::utils::with_suffix;
/// use std::path::Path;
///
/// assert_eq!(
///     with_suffix(Path::new("/books/Ep.1"), ".info.json"),
///     Path::new("/books/Ep.1.info.json")
/// );
/// ```
pub fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = base.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Wait until `path` exists and can be opened for reading
///
/// Polls every `poll` until `budget` has elapsed. Returns `false` on timeout.
pub async fn wait_for_file(path: &Path, budget: Duration, poll: Duration) -> bool {
    debug!(path = %path.display(), "waiting for file");
    let deadline = tokio::time::Instant::now() + budget;

    loop {
        if is_readable(path).await {
            debug!(path = %path.display(), "file ready");
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(
                path = %path.display(),
                waited_ms = budget.as_millis(),
                "timed out waiting for file"
            );
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}

async fn is_readable(path: &Path) -> bool {
    match tokio::fs::File::open(path).await {
        Ok(mut file) => {
            let mut buf = [0u8; 1];
            file.read(&mut buf).await.is_ok()
        }
        Err(_) => false,
    }
}

/// Move `source` to `destination`, never losing the file
///
/// Tries an atomic rename first and falls back to copy-then-remove (for
/// cross-device moves). If the move cannot complete, a partial copy this call
/// created is removed and the source path is returned, so the caller always
/// gets back the path where the file actually lives. A destination that
/// already existed is never deleted.
pub async fn move_preserving(source: &Path, destination: &Path) -> PathBuf {
    if source == destination {
        return source.to_path_buf();
    }

    let rename_err = match tokio::fs::rename(source, destination).await {
        Ok(()) => {
            info!(from = %source.display(), to = %destination.display(), "renamed file");
            return destination.to_path_buf();
        }
        Err(e) => e,
    };

    debug!(
        from = %source.display(),
        to = %destination.display(),
        error = %rename_err,
        "rename failed, falling back to copy"
    );

    // an unknown state is treated as existing
    let destination_existed = tokio::fs::try_exists(destination).await.unwrap_or(true);
    if let Err(e) = tokio::fs::copy(source, destination).await {
        warn!(
            from = %source.display(),
            to = %destination.display(),
            error = %e,
            "could not move file, keeping original name"
        );
        if destination_existed {
            return source.to_path_buf();
        }
        if let Err(cleanup) = tokio::fs::remove_file(destination).await
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %destination.display(), error = %cleanup, "failed to remove partial copy");
        }
        return source.to_path_buf();
    }

    if let Err(e) = tokio::fs::remove_file(source).await {
        warn!(path = %source.display(), error = %e, "copied file but could not remove source");
    }
    info!(from = %source.display(), to = %destination.display(), "moved file");
    destination.to_path_buf()
}

/// Best-effort removal of `{base}{suffix}` for every suffix
///
/// Returns how many files were removed. Failures are logged and skipped.
pub async fn remove_artifacts(base: &Path, suffixes: &[String]) -> usize {
    let mut removed = 0;
    for suffix in suffixes {
        let path = with_suffix(base, suffix);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed transient file");
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove transient file"),
        }
    }
    removed
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it
///
/// Parent directories are created as needed. The document is written to a
/// sibling temp file first and renamed over the target.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> std::io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = with_suffix(path, ".tmp");
    tokio::fs::write(&tmp, &bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
