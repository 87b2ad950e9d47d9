//! Cover art lookup and normalization

use crate::config::RetryConfig;
use crate::error::{CoverError, Error};
use crate::retry::download_with_retry;
use crate::types::MediaInfo;
use crate::utils::browser_client;
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{ImageEncoder, Rgb, RgbImage};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

/// Edge length of the square cover embedded into audio files
pub const COVER_SIZE: u32 = 400;

const JPEG_QUALITY: u8 = 95;
const PADDING_BLUR_SIGMA: f32 = 10.0;

static COVER_URL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""coverUrl":"([^"]+)""#).ok());

/// Produces cover art for a part
#[async_trait]
pub trait CoverSource: Send + Sync {
    /// JPEG bytes ready to embed
    async fn cover_for(&self, info: &MediaInfo) -> Result<Vec<u8>, CoverError>;
}

/// Downloads the part's thumbnail and squares it
///
/// Lookup order: `thumbnail`, then the last (best) entry of `thumbnails`,
/// then a `"coverUrl"` scraped from the part's web page.
#[derive(Clone, Debug)]
pub struct HttpCoverSource {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl HttpCoverSource {
    /// Cover source with the given HTTP timeout and retry policy
    pub fn new(timeout: Duration, retry: RetryConfig) -> crate::Result<Self> {
        Ok(Self {
            client: browser_client(timeout)?,
            retry,
        })
    }

    async fn resolve_url(&self, info: &MediaInfo) -> Option<String> {
        if let Some(url) = info.thumbnail.as_deref().filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
        if let Some(thumb) = info.thumbnails.last().filter(|t| !t.url.is_empty()) {
            return Some(thumb.url.clone());
        }

        let page_url = info.webpage_url.as_deref()?;
        let page = match self.get_bytes(page_url).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                debug!(url = page_url, error = %e, "could not fetch page for cover lookup");
                return None;
            }
        };
        scrape_cover_url(&page).and_then(|raw| absolutize(page_url, &raw))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, Error> {
        download_with_retry(&self.retry, move || async move {
            let response = self.client.get(url).send().await?.error_for_status()?;
            Ok::<_, Error>(response.bytes().await?.to_vec())
        })
        .await
    }
}

#[async_trait]
impl CoverSource for HttpCoverSource {
    async fn cover_for(&self, info: &MediaInfo) -> Result<Vec<u8>, CoverError> {
        let url = self.resolve_url(info).await.ok_or(CoverError::NotAvailable)?;
        info!(%url, "found cover");

        let raw = self
            .get_bytes(&url)
            .await
            .map_err(|e| CoverError::Download(e.to_string()))?;

        tokio::task::spawn_blocking(move || normalize_cover(&raw))
            .await
            .map_err(|e| CoverError::Image(format!("cover worker failed: {e}")))?
    }
}

/// `"coverUrl":"…"` value from a page body
pub fn scrape_cover_url(page: &str) -> Option<String> {
    COVER_URL_PATTERN
        .as_ref()?
        .captures(page)?
        .get(1)
        .map(|m| m.as_str().replace("\\u002F", "/"))
}

/// Scraped URLs are often protocol-relative (`//i0.hdslb.com/...`)
fn absolutize(page_url: &str, raw: &str) -> Option<String> {
    let base = url::Url::parse(page_url).ok()?;
    base.join(raw).ok().map(String::from)
}

/// Square an image and encode it as a 400×400 JPEG
///
/// The source is centred on a square canvas whose side is its longer edge.
/// The padding is filled by stretching the nearest edge pixels outwards and
/// blurring them; the original pixels stay sharp.
pub fn normalize_cover(raw: &[u8]) -> Result<Vec<u8>, CoverError> {
    let source = image::load_from_memory(raw)
        .map_err(|e| CoverError::Image(e.to_string()))?
        .to_rgb8();
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(CoverError::Image("empty image".into()));
    }

    let side = width.max(height);
    let x_off = (side - width) / 2;
    let y_off = (side - height) / 2;

    let mut canvas = RgbImage::from_pixel(side, side, Rgb([255, 255, 255]));
    for y in 0..side {
        for x in 0..side {
            let sx = x.saturating_sub(x_off).min(width - 1);
            let sy = y.saturating_sub(y_off).min(height - 1);
            canvas.put_pixel(x, y, *source.get_pixel(sx, sy));
        }
    }

    let mut squared = if side == width && side == height {
        canvas
    } else {
        imageops::blur(&canvas, PADDING_BLUR_SIGMA)
    };
    imageops::replace(&mut squared, &source, i64::from(x_off), i64::from(y_off));

    let resized = imageops::resize(&squared, COVER_SIZE, COVER_SIZE, FilterType::Lanczos3);
    debug!(width, height, side, "normalized cover");

    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY)
        .write_image(
            resized.as_raw(),
            COVER_SIZE,
            COVER_SIZE,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| CoverError::Image(e.to_string()))?;
    Ok(out)
}
