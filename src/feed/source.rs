use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::time::Instant;

/// Why a single source could not be read.
///
/// Every variant is per-source: the aggregator logs it, records it in
/// `Aggregation::failures` and carries on with the remaining feeds.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with a non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// A single request exceeded its time budget
    #[error("Request timed out")]
    Timeout,
    /// Body could not be parsed as RSS, Atom or JSON Feed
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server kept answering 429 Too Many Requests
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the configured size cap
    #[error("Response too large")]
    ResponseTooLarge,
    /// The shared aggregation deadline passed before this source finished
    #[error("Aggregation deadline exceeded")]
    DeadlineExceeded,
}

/// One entry of a fetched feed, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedItem {
    pub title: String,
    pub link: String,
    /// Raw HTML body as published (content, falling back to summary)
    pub content: String,
    /// Image the feed attached to the entry, if any
    pub image: Option<String>,
    pub published: DateTime<Utc>,
}

/// A parsed feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFeed {
    pub title: String,
    /// Site link the feed advertises
    pub link: Option<String>,
    /// Feed logo or icon
    pub image: Option<String>,
    pub items: Vec<FetchedItem>,
}

/// Something that can turn a feed URL into a parsed feed.
///
/// `deadline` is the shared aggregation deadline; implementations must not
/// start work (retries, backoff sleeps) that cannot finish before it.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str, deadline: Instant) -> Result<FetchedFeed, FetchError>;
}
