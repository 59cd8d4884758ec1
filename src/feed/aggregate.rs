use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use super::source::{FeedSource, FetchError, FetchedFeed};
use crate::config::Config;
use crate::content::{
    format_display_time, format_relative_time, repair_malformed_markup, resolve_display_image,
    resolve_feed_badge,
};
use crate::storage::{Database, FeedSubscription, HistoryRecord, StoreError};

const DEFAULT_DEADLINE: Duration = Duration::from_secs(60);
/// Longer budgets are cut down to this; `Instant` arithmetic panics on overflow.
const MAX_DEADLINE: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_CONCURRENCY: usize = 8;
const DEFAULT_FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons?sz=16&domain=";

// ============================================================================
// Options and Results
// ============================================================================

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Budget for the whole multi-feed fetch, not per feed
    pub deadline: Duration,
    /// Sources fetched at the same time
    pub max_concurrent: usize,
    /// Favicon URL prefix; the feed host is appended
    pub favicon_service: String,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            max_concurrent: DEFAULT_CONCURRENCY,
            favicon_service: DEFAULT_FAVICON_SERVICE.to_string(),
        }
    }
}

impl AggregateOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            deadline: Duration::from_secs(config.fetch_deadline_secs),
            max_concurrent: config.max_concurrent_fetches.max(1),
            favicon_service: config.favicon_service.clone(),
        }
    }
}

/// One entry of the merged reading list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub feed_title: String,
    pub feed_image: String,
    pub title: String,
    pub link: String,
    pub published: DateTime<Utc>,
    /// "3 hours ago", relative to the `now` the aggregation ran with
    pub time_since: String,
    pub time: String,
    pub image: String,
    pub content: String,
    pub read: bool,
}

impl FeedItem {
    /// The history row this item persists as.
    pub fn to_record(&self) -> HistoryRecord {
        HistoryRecord {
            link: self.link.clone(),
            feed_title: self.feed_title.clone(),
            feed_image: self.feed_image.clone(),
            title: self.title.clone(),
            time_since: self.time_since.clone(),
            time: self.time.clone(),
            image: self.image.clone(),
            content: self.content.clone(),
            read: self.read,
        }
    }
}

/// A source that was skipped, and why.
#[derive(Debug)]
pub struct SourceFailure {
    pub link: String,
    pub error: FetchError,
}

#[derive(Debug, Default)]
pub struct Aggregation {
    /// Newest first
    pub items: Vec<FeedItem>,
    /// In feed-list order
    pub failures: Vec<SourceFailure>,
}

impl Aggregation {
    pub fn to_records(&self) -> Vec<HistoryRecord> {
        self.items.iter().map(FeedItem::to_record).collect()
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Merges many feeds into one reading list.
///
/// Aggregation is read-only against history: it looks up read state but
/// never writes. Persisting the result is up to the caller, typically
/// `db.upsert_history(&aggregation.to_records())`.
pub struct Aggregator<S> {
    source: S,
    options: AggregateOptions,
}

impl<S: FeedSource> Aggregator<S> {
    pub fn new(source: S, options: AggregateOptions) -> Self {
        Self { source, options }
    }

    /// Fetch every feed, merge, sort newest first and join read state.
    ///
    /// A feed that fails or does not finish before the shared deadline is
    /// skipped and reported in [`Aggregation::failures`]; it never fails the
    /// call. Only a history lookup failure is returned as an error.
    pub async fn aggregate(
        &self,
        feeds: &[FeedSubscription],
        db: &Database,
        now: DateTime<Utc>,
    ) -> Result<Aggregation, StoreError> {
        let deadline = Instant::now() + self.options.deadline.min(MAX_DEADLINE);

        let fetched: Vec<(&FeedSubscription, Result<FetchedFeed, FetchError>)> =
            stream::iter(feeds)
                .map(|feed| async move {
                    let result =
                        match tokio::time::timeout_at(deadline, self.source.fetch(&feed.link, deadline))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(FetchError::DeadlineExceeded),
                        };
                    (feed, result)
                })
                .buffered(self.options.max_concurrent.max(1))
                .collect()
                .await;

        let mut failures = Vec::new();
        let mut merged = Vec::new();

        for (subscription, result) in fetched {
            match result {
                Ok(feed) => {
                    let site = feed.link.as_deref().unwrap_or(&subscription.link);
                    let badge = resolve_feed_badge(
                        site,
                        feed.image.as_deref(),
                        &self.options.favicon_service,
                    );
                    merged.extend(
                        feed.items
                            .into_iter()
                            .map(|item| (feed.title.clone(), badge.clone(), item)),
                    );
                }
                Err(error) => {
                    tracing::warn!(feed = %subscription.link, error = %error, "Skipping feed");
                    failures.push(SourceFailure {
                        link: subscription.link.clone(),
                        error,
                    });
                }
            }
        }

        // Stable: equal timestamps keep feed-list order
        merged.sort_by(|(_, _, a), (_, _, b)| b.published.cmp(&a.published));

        let links: Vec<&str> = merged.iter().map(|(_, _, item)| item.link.as_str()).collect();
        let read_states = db.read_states(&links).await?;

        let items: Vec<FeedItem> = merged
            .into_iter()
            .map(|(feed_title, feed_image, item)| {
                let read = read_states.get(&item.link).copied().unwrap_or(false);
                FeedItem {
                    feed_title,
                    feed_image,
                    image: resolve_display_image(item.image.as_deref(), &item.content),
                    time_since: format_relative_time(item.published, now),
                    time: format_display_time(item.published),
                    content: repair_malformed_markup(&item.content),
                    title: item.title,
                    link: item.link,
                    published: item.published,
                    read,
                }
            })
            .collect();

        tracing::info!(
            feeds = feeds.len(),
            failed = failures.len(),
            items = items.len(),
            "Aggregation complete"
        );

        Ok(Aggregation { items, failures })
    }
}
