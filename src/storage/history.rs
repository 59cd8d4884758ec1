use std::collections::HashMap;

use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{HistoryRecord, StoreError};

/// Rows per multi-row INSERT. 9 columns * 50 = 450 bind parameters, well
/// under SQLite's 999 limit.
const UPSERT_BATCH_SIZE: usize = 50;

/// Links per `IN (...)` lookup.
const LOOKUP_BATCH_SIZE: usize = 500;

const SELECT_HISTORY: &str = r#"
    SELECT Link AS link, FeedTitle AS feed_title, FeedImage AS feed_image,
           Title AS title, TimeSince AS time_since, Time AS time,
           Image AS image, Content AS content, Readed AS read
    FROM History
"#;

impl Database {
    // ========================================================================
    // History Writes
    // ========================================================================

    /// Insert or fully overwrite history rows keyed by link.
    ///
    /// The whole batch runs in one transaction: either every record is
    /// written or none is. Writing the same link twice (across calls or
    /// within one batch) leaves a single row holding the last values.
    pub async fn upsert_history(&self, records: &[HistoryRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in records.chunks(UPSERT_BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO History (Link, FeedTitle, FeedImage, Title, TimeSince, Time, Image, Content, Readed) ",
            );

            builder.push_values(chunk, |mut b, record| {
                b.push_bind(&record.link)
                    .push_bind(&record.feed_title)
                    .push_bind(&record.feed_image)
                    .push_bind(&record.title)
                    .push_bind(&record.time_since)
                    .push_bind(&record.time)
                    .push_bind(&record.image)
                    .push_bind(&record.content)
                    .push_bind(record.read);
            });

            builder.push(
                " ON CONFLICT(Link) DO UPDATE SET \
                 FeedTitle = excluded.FeedTitle, FeedImage = excluded.FeedImage, \
                 Title = excluded.Title, TimeSince = excluded.TimeSince, Time = excluded.Time, \
                 Image = excluded.Image, Content = excluded.Content, Readed = excluded.Readed",
            );

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::debug!(records = records.len(), "History upserted");
        Ok(())
    }

    /// Set the read flag of one link. Returns whether a row was changed;
    /// an unknown link is not an error.
    pub async fn set_read_state(&self, link: &str, read: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE History SET Readed = ? WHERE Link = ?")
            .bind(read)
            .bind(link)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every history row, returning how many were removed.
    pub async fn clear_history(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM History")
            .execute(&self.pool)
            .await?;
        tracing::info!(removed = result.rows_affected(), "History cleared");
        Ok(result.rows_affected())
    }

    // ========================================================================
    // History Queries
    // ========================================================================

    /// Whether a row exists for `link`.
    pub async fn history_contains(&self, link: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM History WHERE Link = ?")
            .bind(link)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    /// Stored read flag for `link`; `false` (unread) when absent.
    pub async fn read_state_of(&self, link: &str) -> Result<bool, StoreError> {
        let row: Option<(bool,)> = sqlx::query_as("SELECT Readed FROM History WHERE Link = ?")
            .bind(link)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some_and(|(read,)| read))
    }

    /// Read flags for every known link in `links`, from one snapshot.
    ///
    /// Links with no row are omitted from the map.
    pub async fn read_states(&self, links: &[&str]) -> Result<HashMap<String, bool>, StoreError> {
        let mut states = HashMap::with_capacity(links.len());
        if links.is_empty() {
            return Ok(states);
        }

        let mut tx = self.pool.begin().await?;

        for chunk in links.chunks(LOOKUP_BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("SELECT Link, Readed FROM History WHERE Link IN (");
            let mut separated = builder.separated(", ");
            for link in chunk {
                separated.push_bind(*link);
            }
            separated.push_unseparated(")");

            let rows: Vec<(String, bool)> = builder.build_query_as().fetch_all(&mut *tx).await?;
            states.extend(rows);
        }

        tx.commit().await?;
        Ok(states)
    }

    /// All history rows, most recent publish time first.
    pub async fn list_history(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        let records = sqlx::query_as::<_, HistoryRecord>(&format!(
            "{SELECT_HISTORY} ORDER BY Time DESC, Link"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// The row for `link`, if any.
    pub async fn history_record(&self, link: &str) -> Result<Option<HistoryRecord>, StoreError> {
        let record = sqlx::query_as::<_, HistoryRecord>(&format!("{SELECT_HISTORY} WHERE Link = ?"))
            .bind(link)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, HistoryRecord};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_record(link: &str, time: &str) -> HistoryRecord {
        HistoryRecord {
            link: link.to_string(),
            feed_title: "Example Feed".to_string(),
            feed_image: "https://example.com/icon.png".to_string(),
            title: format!("Title for {link}"),
            time_since: "1 hour ago".to_string(),
            time: time.to_string(),
            image: String::new(),
            content: "<p>Body</p>".to_string(),
            read: false,
        }
    }

    async fn row_count(db: &Database) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM History")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn test_upsert_and_list() {
        let db = test_db().await;
        db.upsert_history(&[
            test_record("https://example.com/a", "2024-01-01 10:00"),
            test_record("https://example.com/b", "2024-01-03 10:00"),
            test_record("https://example.com/c", "2024-01-02 10:00"),
        ])
        .await
        .unwrap();

        let links: Vec<String> = db
            .list_history()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.link)
            .collect();
        assert_eq!(
            links,
            vec![
                "https://example.com/b",
                "https://example.com/c",
                "https://example.com/a"
            ]
        );
    }

    #[tokio::test]
    async fn test_upsert_same_link_overwrites() {
        let db = test_db().await;
        db.upsert_history(&[test_record("https://example.com/a", "2024-01-01 10:00")])
            .await
            .unwrap();

        let mut updated = test_record("https://example.com/a", "2024-01-01 10:00");
        updated.title = "Renamed".to_string();
        updated.time_since = "2 hours ago".to_string();
        updated.read = true;
        db.upsert_history(&[updated.clone()]).await.unwrap();

        assert_eq!(row_count(&db).await, 1);
        let stored = db
            .history_record("https://example.com/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn test_upsert_duplicates_within_batch_keep_last() {
        let db = test_db().await;
        let first = test_record("https://example.com/a", "2024-01-01 10:00");
        let mut second = first.clone();
        second.title = "Second".to_string();

        db.upsert_history(&[first, second]).await.unwrap();

        assert_eq!(row_count(&db).await, 1);
        let stored = db
            .history_record("https://example.com/a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "Second");
    }

    #[tokio::test]
    async fn test_upsert_large_batch_spans_chunks() {
        let db = test_db().await;
        let records: Vec<_> = (0..125)
            .map(|i| test_record(&format!("https://example.com/{i}"), "2024-01-01 10:00"))
            .collect();

        db.upsert_history(&records).await.unwrap();
        assert_eq!(row_count(&db).await, 125);
    }

    #[tokio::test]
    async fn test_upsert_empty_batch() {
        let db = test_db().await;
        db.upsert_history(&[]).await.unwrap();
        assert_eq!(row_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        let db = test_db().await;
        // Force the second chunk to fail after the first one succeeded
        sqlx::query(
            "CREATE TRIGGER reject_poison BEFORE INSERT ON History \
             WHEN new.Link = 'poison' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let mut records: Vec<_> = (0..60)
            .map(|i| test_record(&format!("https://example.com/{i}"), "2024-01-01 10:00"))
            .collect();
        records.push(test_record("poison", "2024-01-01 10:00"));

        assert!(db.upsert_history(&records).await.is_err());
        assert_eq!(row_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_read_state_defaults_to_unread() {
        let db = test_db().await;
        assert!(!db.read_state_of("https://example.com/missing").await.unwrap());
        assert!(!db.history_contains("https://example.com/missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_read_state() {
        let db = test_db().await;
        db.upsert_history(&[test_record("https://example.com/a", "2024-01-01 10:00")])
            .await
            .unwrap();
        assert!(db.history_contains("https://example.com/a").await.unwrap());

        assert!(db.set_read_state("https://example.com/a", true).await.unwrap());
        assert!(db.read_state_of("https://example.com/a").await.unwrap());

        assert!(db.set_read_state("https://example.com/a", false).await.unwrap());
        assert!(!db.read_state_of("https://example.com/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_read_state_unknown_link() {
        let db = test_db().await;
        let changed = db
            .set_read_state("https://example.com/missing", true)
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(row_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_read_states_batch() {
        let db = test_db().await;
        let mut read = test_record("https://example.com/read", "2024-01-01 10:00");
        read.read = true;
        db.upsert_history(&[
            read,
            test_record("https://example.com/unread", "2024-01-01 10:00"),
        ])
        .await
        .unwrap();

        let states = db
            .read_states(&[
                "https://example.com/read",
                "https://example.com/unread",
                "https://example.com/missing",
            ])
            .await
            .unwrap();

        assert_eq!(states.len(), 2);
        assert_eq!(states.get("https://example.com/read"), Some(&true));
        assert_eq!(states.get("https://example.com/unread"), Some(&false));
        assert_eq!(states.get("https://example.com/missing"), None);
    }

    #[tokio::test]
    async fn test_read_states_empty_input() {
        let db = test_db().await;
        assert!(db.read_states(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_history() {
        let db = test_db().await;
        db.upsert_history(&[
            test_record("https://example.com/a", "2024-01-01 10:00"),
            test_record("https://example.com/b", "2024-01-01 11:00"),
        ])
        .await
        .unwrap();

        assert_eq!(db.clear_history().await.unwrap(), 2);
        assert!(db.list_history().await.unwrap().is_empty());
        assert_eq!(db.clear_history().await.unwrap(), 0);
    }
}
