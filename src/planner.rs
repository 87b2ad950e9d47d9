//! Part planning: how many parts a collection has and where each one lives

use crate::config::DownloadConfig;
use crate::error::Result;
use crate::types::CollectionId;
use crate::utils::browser_client;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

static PAGE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""page":(\d+),"#).ok());

/// Resolves the parts of a collection
#[async_trait]
pub trait PartPlanner: Send + Sync {
    /// Number of parts in the collection
    ///
    /// Never fails: anything that prevents counting yields `1`.
    async fn plan(&self, collection: &CollectionId) -> u32;

    /// URL the fetcher should use for one part
    fn part_url(&self, collection: &CollectionId, part: u32) -> String;
}

/// Counts parts by scanning the collection's page for `"page":N,` markers
#[derive(Clone, Debug)]
pub struct PageCountPlanner {
    client: reqwest::Client,
    base_url: String,
}

impl PageCountPlanner {
    /// Planner for the configured site
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        Ok(Self {
            client: browser_client(config.socket_timeout)?,
            base_url: config.site_base_url.clone(),
        })
    }

    /// Planner against a different base URL (mirrors, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn collection_url(&self, collection: &CollectionId) -> String {
        format!("{}{}", self.base_url, collection)
    }
}

#[async_trait]
impl PartPlanner for PageCountPlanner {
    async fn plan(&self, collection: &CollectionId) -> u32 {
        let url = self.collection_url(collection);
        info!(%url, "checking part count");

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(%url, error = %e, "part count probe failed, assuming a single part");
                return 1;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            warn!(%url, status = %response.status(), "part count probe rejected, assuming a single part");
            return 1;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(%url, error = %e, "could not read collection page, assuming a single part");
                return 1;
            }
        };

        match max_page(&body) {
            Some(count) => {
                info!(collection_id = %collection, count, "detected multi-part collection");
                count
            }
            None => {
                info!(collection_id = %collection, "no part markers found, single part");
                1
            }
        }
    }

    fn part_url(&self, collection: &CollectionId, part: u32) -> String {
        format!("{}?p={}", self.collection_url(collection), part)
    }
}

/// Largest positive `"page":N,` value in a page body
fn max_page(body: &str) -> Option<u32> {
    PAGE_PATTERN
        .as_ref()?
        .captures_iter(body)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .filter(|&n| n > 0)
        .max()
}
