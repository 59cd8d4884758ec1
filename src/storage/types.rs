use serde::Serialize;
use thiserror::Error;

use crate::crypto::CryptoError;

// ============================================================================
// Error Types
// ============================================================================

/// The store could not be opened or a statement/transaction failed.
///
/// Always propagated: a failed write is never silently dropped.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process holds the database lock
    #[error("The database is locked by another process. Close it and try again.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, recognising lock contention.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return StoreError::Locked;
        }

        StoreError::Unavailable(err)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::from_sqlx(err)
    }
}

/// Errors from the protected settings API.
#[derive(Debug, Error)]
pub enum SettingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<sqlx::Error> for SettingError {
    fn from(err: sqlx::Error) -> Self {
        SettingError::Store(StoreError::from(err))
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// One persisted reading-list entry, keyed by `link`.
///
/// Display fields are snapshots taken at aggregation time; `time` uses
/// [`crate::content::DISPLAY_TIME_FORMAT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct HistoryRecord {
    pub link: String,
    pub feed_title: String,
    pub feed_image: String,
    pub title: String,
    pub time_since: String,
    pub time: String,
    pub image: String,
    pub content: String,
    pub read: bool,
}

/// A subscribed feed: unique `link` plus a free-form category label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct FeedSubscription {
    pub link: String,
    pub category: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_contention_classified_as_locked() {
        let busy = sqlx::Error::Protocol("database is locked".to_string());
        assert!(matches!(StoreError::from(busy), StoreError::Locked));

        let table = sqlx::Error::Protocol("database table is locked: History".to_string());
        assert!(matches!(StoreError::from(table), StoreError::Locked));
    }

    #[test]
    fn test_open_failure_is_not_a_lock() {
        let cantopen = sqlx::Error::Protocol("unable to open database file".to_string());
        let err = StoreError::from(cantopen);
        assert!(matches!(err, StoreError::Unavailable(_)), "got {err:?}");
        assert!(!err.to_string().contains("locked"));

        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn test_setting_error_keeps_lock_classification() {
        let err = SettingError::from(sqlx::Error::Protocol("database is locked".to_string()));
        assert!(matches!(err, SettingError::Store(StoreError::Locked)));
    }
}
