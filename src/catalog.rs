// Catalog API client and cache listing
//
// Thin request/response wrapper over the remote search/metadata API. Nothing
// here retries; failures surface to the caller as UpstreamUnavailable.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::config::CatalogConfig;
use crate::error::{Result, JayeError};
use crate::models::VideoInfo;

/// Search and metadata lookups against the catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Video IDs matching `query`, in catalog order
    async fn search(&self, query: &str) -> Result<Vec<String>>;

    /// Metadata for one video
    async fn info(&self, id: &str) -> Result<VideoInfo>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    id: String,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

/// HTTP client for the YouTube Data API shape
pub struct CatalogClient {
    client: Client,
    base_url: String,
    token: String,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("jaye/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| JayeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("Querying catalog endpoint {}", url);

        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.token.as_str())])
            .send()
            .await
            // without_url keeps the API key out of error text
            .map_err(|e| JayeError::UpstreamUnavailable(format!("Failed to query catalog: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(JayeError::UpstreamUnavailable(format!(
                "Catalog {} returned {}",
                endpoint, status
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| JayeError::UpstreamUnavailable(format!("Failed to decode {} response: {}", endpoint, e.without_url())))
    }
}

#[async_trait]
impl CatalogApi for CatalogClient {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let response: SearchResponse = self
            .get("search", &[("q", query), ("part", "snippet"), ("type", "video")])
            .await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|item| item.id.video_id)
            .collect())
    }

    async fn info(&self, id: &str) -> Result<VideoInfo> {
        let response: VideosResponse = self
            .get("videos", &[("id", id), ("part", "snippet")])
            .await?;

        let item = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| JayeError::NotFound(format!("no video for id {}", id)))?;

        let thumbnail = item.snippet.thumbnails.high.map(|t| t.url).unwrap_or_default();
        Ok(VideoInfo::new(item.id, item.snippet.title, thumbnail))
    }
}

/// Every cached video resolved through the catalog, oldest cache entry first.
/// One unresolvable entry fails the whole listing.
pub async fn list(store: &CacheStore, catalog: &dyn CatalogApi) -> Result<Vec<VideoInfo>> {
    let entries = store.scan().await?;
    let mut videos = Vec::with_capacity(entries.len());

    for entry in entries {
        match catalog.info(&entry.id).await {
            Ok(info) => videos.push(info),
            Err(e) => {
                warn!("Failed to resolve cached video {}: {}", entry.id, e);
                return Err(JayeError::PartialListFailure(format!(
                    "failed to retrieve video info for {}: {}",
                    entry.id, e
                )));
            }
        }
    }

    Ok(videos)
}
