mod feeds;
mod history;
mod schema;
mod settings;
mod types;

pub use schema::Database;
pub use types::{FeedSubscription, HistoryRecord, SettingError, StoreError};
