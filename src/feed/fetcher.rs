use async_trait::async_trait;
use futures::StreamExt;
use reqwest::redirect::Policy;
use std::time::Duration;
use tokio::time::Instant;

use super::parser::{parse_feed, ParsedFeed};
use super::source::{FeedSource, FetchError, FetchedFeed};

const MAX_RETRIES: u32 = 3;
const MAX_REDIRECTS: usize = 3;

/// Per-request ceiling; the shared deadline usually clips it further.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// HTTP implementation of [`FeedSource`] built on a shared `reqwest::Client`.
///
/// # Behavior
///
/// - Each attempt is bounded by `min(30s, time left before the deadline)`
/// - HTTP 429 and 5xx retry with exponential backoff (1s, 2s, 4s by default),
///   but only while the backoff sleep ends before the deadline
/// - Other non-2xx statuses fail immediately
/// - Bodies larger than `max_bytes` are rejected without being buffered
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    max_bytes: usize,
    backoff: Duration,
}

impl HttpFeedSource {
    pub fn new(user_agent: &str, max_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(redirect_policy())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            max_bytes,
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Base delay of the retry backoff; doubled on each attempt.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sleep before the next attempt, or give up if the sleep would run
    /// past the deadline.
    async fn back_off(
        &self,
        url: &str,
        retry: u32,
        deadline: Instant,
        give_up: impl FnOnce() -> FetchError,
    ) -> Result<(), FetchError> {
        if retry >= MAX_RETRIES {
            return Err(give_up());
        }

        let delay = self.backoff.saturating_mul(2u32.saturating_pow(retry));
        if delay >= deadline.saturating_duration_since(Instant::now()) {
            tracing::debug!(feed = %url, retry = retry, "Backoff would overrun deadline, giving up");
            return Err(give_up());
        }

        tracing::warn!(
            feed = %url,
            retry = retry,
            delay_ms = delay.as_millis() as u64,
            "Retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn fetch_bytes(&self, url: &str, deadline: Instant) -> Result<Vec<u8>, FetchError> {
        let mut retry_count = 0;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(FetchError::DeadlineExceeded);
            }
            let clipped = remaining < REQUEST_TIMEOUT;

            let response = match tokio::time::timeout(
                remaining.min(REQUEST_TIMEOUT),
                self.client.get(url).send(),
            )
            .await
            {
                Ok(result) => result.map_err(|e| {
                    if e.is_timeout() {
                        FetchError::Timeout
                    } else {
                        FetchError::Network(e)
                    }
                })?,
                Err(_) if clipped => return Err(FetchError::DeadlineExceeded),
                Err(_) => return Err(FetchError::Timeout),
            };

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.back_off(url, retry_count, deadline, || {
                    FetchError::RateLimited(retry_count)
                })
                .await?;
                retry_count += 1;
                continue;
            }

            if status.is_server_error() {
                self.back_off(url, retry_count, deadline, || {
                    FetchError::HttpStatus(status.as_u16())
                })
                .await?;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            return tokio::time::timeout_at(deadline, read_limited_bytes(response, self.max_bytes))
                .await
                .map_err(|_| FetchError::DeadlineExceeded)?;
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str, deadline: Instant) -> Result<FetchedFeed, FetchError> {
        let bytes = self.fetch_bytes(url, deadline).await?;
        let ParsedFeed { feed, skipped } = parse_feed(&bytes)?;

        if skipped > 0 {
            tracing::warn!(
                feed = %url,
                skipped = skipped,
                "Entries without link or timestamp skipped"
            );
        }
        tracing::debug!(feed = %url, items = feed.items.len(), "Feed fetched");

        Ok(feed)
    }
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(to = %url, hop = attempt.previous().len() + 1, "Following redirect");
        attempt.follow()
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: Content-Length already over the cap
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
