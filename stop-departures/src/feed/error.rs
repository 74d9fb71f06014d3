//! Upstream feed error types.

/// Errors from fetching upstream timetable or live data.
///
/// Every non-success response or transport problem surfaces as one of these;
/// an upstream failure never silently becomes empty data at this layer.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// HTTP request failed (connection, TLS, body read, ...)
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Request exceeded the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Invalid API key or unauthorized
    #[error("unauthorized (check BODS_API_KEY)")]
    Unauthorized,

    /// API returned an error status code
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Metadata response could not be decoded
    #[error("JSON parse error: {message}")]
    Json { message: String },

    /// Dataset metadata has no download location
    #[error("dataset {dataset_id} has no download URL")]
    MissingDownloadUrl { dataset_id: String },
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FeedError::Timeout
        } else {
            FeedError::Http(err)
        }
    }
}
