use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::error::ServiceError;
use crate::application::jobs::{FanOutJob, emit_lifecycle_event};
use crate::application::pagination::{CursorPage, PageRequest};
use crate::application::repos::{
    CreatePostParams, FanOutQueue, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::PostRecord;
use crate::domain::posts::generate_post_id;

/// Attempts at finding an unused post id before giving up.
const POST_ID_ATTEMPTS: usize = 8;

#[derive(Clone)]
pub struct PostService {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    queue: Arc<dyn FanOutQueue>,
}

impl PostService {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        queue: Arc<dyn FanOutQueue>,
    ) -> Self {
        Self {
            reader,
            writer,
            queue,
        }
    }

    pub async fn get_post(&self, post_id: &str) -> Result<PostRecord, ServiceError> {
        self.reader
            .find_post_by_id(post_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(post_id.to_string()))
    }

    pub async fn create_post(
        &self,
        author_id: &str,
        text: String,
    ) -> Result<PostRecord, ServiceError> {
        let created_at = OffsetDateTime::now_utc();
        let mut attempt = 0;

        let post = loop {
            attempt += 1;
            let params = CreatePostParams {
                id: generate_post_id(),
                author_id: author_id.to_string(),
                text: text.clone(),
                created_at,
            };
            match self.writer.create_post(params).await {
                Ok(post) => break post,
                Err(RepoError::Duplicate { constraint }) if attempt < POST_ID_ATTEMPTS => {
                    warn!(
                        target = "application::posts",
                        attempt,
                        constraint = %constraint,
                        "post id collision; regenerating"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        };

        info!(
            target = "application::posts",
            post_id = %post.id,
            author_id = %post.author_id,
            "post created"
        );
        emit_lifecycle_event(self.queue.as_ref(), FanOutJob::post_created(&post)).await;
        Ok(post)
    }

    pub async fn modify_post(
        &self,
        user_id: &str,
        post_id: &str,
        text: String,
    ) -> Result<PostRecord, ServiceError> {
        let params = UpdatePostParams {
            id: post_id.to_string(),
            author_id: user_id.to_string(),
            text,
            last_modified_at: OffsetDateTime::now_utc(),
        };

        let post = match self.writer.update_post(params).await {
            Ok(post) => post,
            Err(RepoError::NotFound) => return Err(ServiceError::NotFound(post_id.to_string())),
            Err(RepoError::Forbidden) => {
                return Err(ServiceError::Forbidden {
                    user_id: user_id.to_string(),
                    post_id: post_id.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            target = "application::posts",
            post_id = %post.id,
            author_id = %post.author_id,
            "post modified"
        );
        emit_lifecycle_event(self.queue.as_ref(), FanOutJob::post_modified(&post)).await;
        Ok(post)
    }

    /// Newest-first timeline of `author_id`.
    pub async fn list_posts(
        &self,
        author_id: &str,
        token: Option<&str>,
        size: Option<i64>,
    ) -> Result<CursorPage<PostRecord>, ServiceError> {
        let page = PageRequest::resolve(token, size)?;
        Ok(self.reader.list_posts_by_author(author_id, page).await?)
    }
}
