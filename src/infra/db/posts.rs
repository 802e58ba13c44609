use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::application::pagination::{CursorPage, PageRequest, PaginationError};
use crate::application::repos::{
    CreatePostParams, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::PostRecord;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PostRow {
    origin_key: i64,
    id: String,
    author_id: String,
    text: String,
    created_at: OffsetDateTime,
    last_modified_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            author_id: row.author_id,
            text: row.text,
            created_at: row.created_at,
            last_modified_at: row.last_modified_at,
            origin_key: row.origin_key,
        }
    }
}

impl PostgresRepositories {
    /// Fail with `InvalidToken` unless `origin_key` names a post of `author_id`.
    async fn ensure_timeline_position(
        &self,
        author_id: &str,
        origin_key: i64,
    ) -> Result<(), RepoError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM posts WHERE origin_key = $1 AND author_id = $2)",
        )
        .bind(origin_key)
        .bind(author_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if exists {
            Ok(())
        } else {
            Err(PaginationError::InvalidToken(format!(
                "position {origin_key} is not in the timeline of `{author_id}`"
            ))
            .into())
        }
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn find_post_by_id(&self, id: &str) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT origin_key, id, author_id, text, created_at, last_modified_at
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn list_posts_by_author(
        &self,
        author_id: &str,
        page: PageRequest,
    ) -> Result<CursorPage<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT origin_key, id, author_id, text, created_at, last_modified_at \
             FROM posts WHERE author_id = ",
        );
        qb.push_bind(author_id);

        if let Some(cursor) = page.cursor.as_ref() {
            let origin_key = cursor.numeric_key()?;
            self.ensure_timeline_position(author_id, origin_key).await?;
            qb.push(" AND origin_key < ");
            qb.push_bind(origin_key);
        }

        qb.push(" ORDER BY origin_key DESC LIMIT ");
        qb.push_bind(page.fetch_limit() as i64);

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let records = rows.into_iter().map(PostRecord::from).collect();
        Ok(CursorPage::from_peeked(records, &page, |post| {
            post.origin_key.to_string()
        }))
    }

    async fn list_all_posts_by_author(
        &self,
        author_id: &str,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT origin_key, id, author_id, text, created_at, last_modified_at
            FROM posts
            WHERE author_id = $1
            ORDER BY origin_key ASC
            "#,
        )
        .bind(author_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            INSERT INTO posts (id, author_id, text, created_at, last_modified_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING origin_key, id, author_id, text, created_at, last_modified_at
            "#,
        )
        .bind(&params.id)
        .bind(&params.author_id)
        .bind(&params.text)
        .bind(params.created_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(PostRecord::from(row))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            UPDATE posts
               SET text = $3,
                   last_modified_at = $4
             WHERE id = $1 AND author_id = $2
            RETURNING origin_key, id, author_id, text, created_at, last_modified_at
            "#,
        )
        .bind(&params.id)
        .bind(&params.author_id)
        .bind(&params.text)
        .bind(params.last_modified_at)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if let Some(row) = row {
            return Ok(PostRecord::from(row));
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM posts WHERE id = $1)")
            .bind(&params.id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Err(if exists {
            RepoError::Forbidden
        } else {
            RepoError::NotFound
        })
    }
}
