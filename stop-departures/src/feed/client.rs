//! BODS HTTP client.
//!
//! Provides async methods for the dataset metadata, dataset download and
//! live vehicle feed endpoints. Handles authentication, concurrency limiting
//! and request timeouts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::registry::BoundingBox;

use super::error::FeedError;

/// Default base URL for the BODS API.
const DEFAULT_BASE_URL: &str = "https://data.bus-data.dft.gov.uk/api/v1";

/// Default maximum concurrent requests.
const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of raw upstream documents.
///
/// This abstraction allows the aggregator to be tested without network
/// access.
pub trait FeedSource: Send + Sync {
    /// Look up where a timetable dataset can be downloaded.
    fn fetch_dataset_metadata(
        &self,
        dataset_id: &str,
    ) -> impl Future<Output = Result<DatasetMetadata, FeedError>> + Send;

    /// Download a timetable document.
    fn fetch_dataset_body(&self, url: &str) -> impl Future<Output = Result<Bytes, FeedError>> + Send;

    /// Fetch the live vehicle document for an area.
    fn fetch_live_feed(
        &self,
        bbox: &BoundingBox,
    ) -> impl Future<Output = Result<Bytes, FeedError>> + Send;
}

/// Resolved dataset metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetMetadata {
    pub download_url: String,
}

/// Dataset endpoint response; only the download URL matters here.
#[derive(Debug, Deserialize)]
struct DatasetDto {
    #[serde(default)]
    url: Option<String>,
}

/// Connection settings for [`BodsClient`].
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub api_key: String,
    /// Root of the v1 API, without a trailing slash.
    pub base_url: String,
    /// Upper bound on requests in flight at once.
    pub max_concurrent: usize,
    /// Applied to every request, connect through body.
    pub timeout: Duration,
}

impl FeedConfig {
    /// Production endpoint with default limits.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// BODS API client.
///
/// Uses a semaphore to limit concurrent requests. Every request is bounded
/// by the configured timeout.
#[derive(Debug, Clone)]
pub struct BodsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    semaphore: Arc<Semaphore>,
}

impl BodsClient {
    /// Create a new client with the given configuration.
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        })
    }

    /// Issue a GET and return the body of a successful response.
    async fn get_bytes(&self, url: &str, query: &[(&str, String)]) -> Result<Bytes, FeedError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FeedError::Api {
                status: 0,
                message: "Semaphore closed".to_string(),
            })?;

        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FeedError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Api {
                status: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        Ok(response.bytes().await?)
    }
}

impl FeedSource for BodsClient {
    async fn fetch_dataset_metadata(&self, dataset_id: &str) -> Result<DatasetMetadata, FeedError> {
        let url = format!("{}/dataset/{}/", self.base_url, dataset_id);
        let body = self
            .get_bytes(&url, &[("api_key", self.api_key.clone())])
            .await?;

        let dto: DatasetDto = serde_json::from_slice(&body).map_err(|e| FeedError::Json {
            message: e.to_string(),
        })?;

        match dto.url {
            Some(download_url) if !download_url.is_empty() => Ok(DatasetMetadata { download_url }),
            _ => Err(FeedError::MissingDownloadUrl {
                dataset_id: dataset_id.to_string(),
            }),
        }
    }

    async fn fetch_dataset_body(&self, url: &str) -> Result<Bytes, FeedError> {
        self.get_bytes(url, &[]).await
    }

    async fn fetch_live_feed(&self, bbox: &BoundingBox) -> Result<Bytes, FeedError> {
        let url = format!("{}/datafeed/", self.base_url);
        self.get_bytes(
            &url,
            &[
                ("boundingBox", bbox.to_query_string()),
                ("api_key", self.api_key.clone()),
            ],
        )
        .await
    }
}
