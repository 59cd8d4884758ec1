//! Feed retrieval and aggregation.
//!
//! - [`source`] - the [`FeedSource`] seam and fetched-feed types
//! - [`parser`] - RSS/Atom/JSON Feed parsing via `feed-rs`
//! - [`fetcher`] - HTTP [`FeedSource`] with deadline-aware retries
//! - [`aggregate`] - merges many feeds into one reading list
//! - [`opml`] - subscription import
//!
//! # Example
//!
//! ```ignore
//! use gleaner::feed::{AggregateOptions, Aggregator, HttpFeedSource};
//!
//! let source = HttpFeedSource::new("gleaner/0.1", 10 * 1024 * 1024)?;
//! let aggregator = Aggregator::new(source, AggregateOptions::default());
//! let result = aggregator.aggregate(&db.list_feeds().await?, &db, chrono::Utc::now()).await?;
//! db.upsert_history(&result.to_records()).await?;
//! ```

pub mod aggregate;
pub mod fetcher;
pub mod opml;
pub mod parser;
pub mod source;

pub use aggregate::{AggregateOptions, Aggregation, Aggregator, FeedItem, SourceFailure};
pub use fetcher::HttpFeedSource;
pub use opml::{import_opml, parse_opml, OpmlError};
pub use parser::{parse_feed, ParsedFeed};
pub use source::{FeedSource, FetchError, FetchedFeed, FetchedItem};
