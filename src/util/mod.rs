//! Utility functions shared by the CLI, OPML import and content normalizer.
//!
//! - **URL validation**: refuse subscriptions that point at local networks
//! - **Host extraction**: favicon fallback for feeds without an image
//!
//! # Examples
//!
//! ```
//! use gleaner::util::{host_of, validate_feed_url};
//!
//! let url = validate_feed_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//! assert_eq!(host_of("https://example.com/a").as_deref(), Some("example.com"));
//! ```

mod feed_url;

pub use feed_url::{host_of, validate_feed_url, FeedUrlError};
