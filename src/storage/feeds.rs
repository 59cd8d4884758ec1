use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{FeedSubscription, StoreError};

impl Database {
    // ========================================================================
    // Feed Subscriptions
    // ========================================================================

    /// All subscriptions, ordered by link.
    pub async fn list_feeds(&self) -> Result<Vec<FeedSubscription>, StoreError> {
        let feeds = sqlx::query_as::<_, FeedSubscription>(
            "SELECT Link AS link, Category AS category FROM Feeds ORDER BY Link",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(feeds)
    }

    /// Subscribe to `link`, or move an existing subscription to `category`.
    pub async fn add_feed(&self, link: &str, category: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO Feeds (Link, Category) VALUES (?, ?)
            ON CONFLICT(Link) DO UPDATE SET Category = excluded.Category
        "#,
        )
        .bind(link)
        .bind(category)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Unsubscribe. Returns whether a subscription existed.
    ///
    /// History rows that came from the feed are kept.
    pub async fn remove_feed(&self, link: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM Feeds WHERE Link = ?")
            .bind(link)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Bulk subscribe, e.g. from an OPML import. Existing links take the
    /// imported category. Returns the number of subscriptions written.
    pub async fn import_feeds(&self, feeds: &[FeedSubscription]) -> Result<usize, StoreError> {
        if feeds.is_empty() {
            return Ok(0);
        }

        const BATCH_SIZE: usize = 100;
        let mut tx = self.pool.begin().await?;

        for chunk in feeds.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO Feeds (Link, Category) ");

            builder.push_values(chunk, |mut b, feed| {
                b.push_bind(&feed.link).push_bind(&feed.category);
            });

            builder.push(" ON CONFLICT(Link) DO UPDATE SET Category = excluded.Category");
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        tracing::info!(count = feeds.len(), "Feeds imported");
        Ok(feeds.len())
    }
}
