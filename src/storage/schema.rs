use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StoreError;

// ============================================================================
// Database
// ============================================================================

/// Owned handle to the SQLite store.
///
/// Open once at startup with [`Database::open`], share by cloning (the pool is
/// reference counted), and call [`Database::close`] at shutdown.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `":memory:"` opens a private in-memory database, useful for tests.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Locked` if another process holds the database
    /// lock, `StoreError::Migration` if the schema cannot be created, and
    /// `StoreError::Unavailable` for other database errors.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // SEC-010: History may hold protected values; pre-create the file
        // user-only so there is no window with default umask permissions.
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            let db_path = std::path::Path::new(path);
            if db_path.exists() {
                let perms = std::fs::Permissions::from_mode(0o600);
                if let Err(e) = std::fs::set_permissions(db_path, perms) {
                    tracing::warn!(path = %path, error = %e, "Failed to set database file permissions");
                }
            } else if db_path.parent().is_some_and(|p| p.as_os_str().is_empty() || p.exists()) {
                // If creation fails, SQLite reports the error at connect time.
                let _file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(db_path)
                    .ok();
            }
        }

        // busy_timeout=5000: writers queue behind each other for up to 5s
        // instead of failing with SQLITE_BUSY.
        let options = SqliteConnectOptions::from_str(&url)?
            .pragma("busy_timeout", "5000")
            .foreign_keys(true);

        // SQLite is single-writer; a handful of connections covers concurrent
        // readers. An in-memory database lives in exactly one connection that
        // must never be recycled.
        let pool_options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(10));
        let pool_options = if path == ":memory:" {
            pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(5)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| match StoreError::from_sqlx(e) {
            StoreError::Locked => StoreError::Locked,
            other => StoreError::Migration(other.to_string()),
        })?;

        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Close the pool, waiting for in-flight queries to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op. Column names follow the on-disk format shared
    /// with earlier releases.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS History (
                Link TEXT PRIMARY KEY NOT NULL,
                FeedTitle TEXT NOT NULL DEFAULT '',
                FeedImage TEXT NOT NULL DEFAULT '',
                Title TEXT NOT NULL DEFAULT '',
                TimeSince TEXT NOT NULL DEFAULT '',
                Time TEXT NOT NULL DEFAULT '',
                Image TEXT NOT NULL DEFAULT '',
                Content TEXT NOT NULL DEFAULT '',
                Readed INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // list_history orders by Time DESC
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_time ON History(Time DESC)")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS Feeds (
                Link TEXT PRIMARY KEY NOT NULL,
                Category TEXT NOT NULL DEFAULT ''
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Key-value settings; protected values are stored as envelopes
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS Settings (
                Key TEXT PRIMARY KEY NOT NULL,
                Value TEXT NOT NULL,
                UpdatedAt TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
