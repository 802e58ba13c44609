use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::application::pagination::{CursorPage, PageRequest, PaginationError};
use crate::application::repos::{FeedContentUpdate, FeedRepo, FeedWriteRepo, RepoError};
use crate::domain::entities::FeedEntryRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct FeedEntryRow {
    subscriber_id: String,
    surrogate_key: i64,
    origin_id: String,
    author_id: String,
    text: String,
    created_at: OffsetDateTime,
    last_modified_at: OffsetDateTime,
}

impl From<FeedEntryRow> for FeedEntryRecord {
    fn from(row: FeedEntryRow) -> Self {
        Self {
            subscriber_id: row.subscriber_id,
            origin_id: row.origin_id,
            author_id: row.author_id,
            text: row.text,
            created_at: row.created_at,
            last_modified_at: row.last_modified_at,
            surrogate_key: row.surrogate_key,
        }
    }
}

#[async_trait]
impl FeedRepo for PostgresRepositories {
    async fn list_feed(
        &self,
        subscriber_id: &str,
        page: PageRequest,
    ) -> Result<CursorPage<FeedEntryRecord>, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT subscriber_id, surrogate_key, origin_id, author_id, text, created_at, \
             last_modified_at FROM feed_entries WHERE subscriber_id = ",
        );
        qb.push_bind(subscriber_id);

        if let Some(cursor) = page.cursor.as_ref() {
            let surrogate_key = cursor.numeric_key()?;
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS (SELECT 1 FROM feed_entries \
                 WHERE subscriber_id = $1 AND surrogate_key = $2)",
            )
            .bind(subscriber_id)
            .bind(surrogate_key)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

            if !exists {
                return Err(PaginationError::InvalidToken(format!(
                    "position {surrogate_key} is not in the feed of `{subscriber_id}`"
                ))
                .into());
            }

            qb.push(" AND surrogate_key < ");
            qb.push_bind(surrogate_key);
        }

        qb.push(" ORDER BY surrogate_key DESC LIMIT ");
        qb.push_bind(page.fetch_limit() as i64);

        let rows = qb
            .build_query_as::<FeedEntryRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let entries = rows.into_iter().map(FeedEntryRecord::from).collect();
        Ok(CursorPage::from_peeked(entries, &page, |entry| {
            entry.surrogate_key.to_string()
        }))
    }
}

#[async_trait]
impl FeedWriteRepo for PostgresRepositories {
    async fn upsert_feed_entry(&self, entry: &FeedEntryRecord) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO feed_entries (
                subscriber_id, surrogate_key, origin_id, author_id, text,
                created_at, last_modified_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (subscriber_id, origin_id) DO UPDATE
               SET text = EXCLUDED.text,
                   last_modified_at = EXCLUDED.last_modified_at
             WHERE feed_entries.last_modified_at <= EXCLUDED.last_modified_at
            "#,
        )
        .bind(&entry.subscriber_id)
        .bind(entry.surrogate_key)
        .bind(&entry.origin_id)
        .bind(&entry.author_id)
        .bind(&entry.text)
        .bind(entry.created_at)
        .bind(entry.last_modified_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_feed_entries(&self, update: &FeedContentUpdate) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE feed_entries
               SET text = $2,
                   last_modified_at = $3
             WHERE origin_id = $1
               AND last_modified_at <= $3
            "#,
        )
        .bind(&update.origin_id)
        .bind(&update.text)
        .bind(update.last_modified_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
