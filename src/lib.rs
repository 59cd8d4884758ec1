//! Merges RSS/Atom feeds into one newest-first reading list, remembers what
//! has been read, and keeps secrets at rest in machine-bound envelopes.
//!
//! - [`feed`] - fetching, parsing and aggregation
//! - [`content`] - display-field derivation (images, relative time, markup repair)
//! - [`storage`] - SQLite history, subscriptions and settings
//! - [`crypto`] - AES-256-GCM envelopes keyed by the machine identity
//! - [`config`] - optional TOML configuration

pub mod config;
pub mod content;
pub mod crypto;
pub mod feed;
pub mod storage;
pub mod util;
