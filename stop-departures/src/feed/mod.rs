//! Bus Open Data Service (BODS) client.
//!
//! Fetches raw timetable datasets and live vehicle feeds. This layer is pure
//! I/O: it returns bytes or a typed [`FeedError`] and never retries. Retry
//! and fallback are the aggregator's business.
//!
//! Timetable access is two-step: the dataset metadata names a download URL,
//! and the body behind that URL is the TransXChange document.

mod client;
mod error;

pub use client::{BodsClient, DatasetMetadata, FeedConfig, FeedSource};
pub use error::FeedError;
