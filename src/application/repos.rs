//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::application::jobs::FanOutJob;
use crate::application::pagination::{CursorPage, PageRequest, PaginationError};
use crate::domain::entities::{FeedEntryRecord, PostRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("operation not permitted for this user")]
    Forbidden,
    #[error("database timeout")]
    Timeout,
    #[error(transparent)]
    Pagination(#[from] PaginationError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: String,
    pub author_id: String,
    pub text: String,
    pub last_modified_at: OffsetDateTime,
}

/// New content for every feed copy of one post.
#[derive(Debug, Clone)]
pub struct FeedContentUpdate {
    pub origin_id: String,
    pub text: String,
    pub last_modified_at: OffsetDateTime,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn find_post_by_id(&self, id: &str) -> Result<Option<PostRecord>, RepoError>;

    /// Newest-first timeline page of one author.
    ///
    /// A cursor whose key is unknown or belongs to another author fails with
    /// `PaginationError::InvalidToken`.
    async fn list_posts_by_author(
        &self,
        author_id: &str,
        page: PageRequest,
    ) -> Result<CursorPage<PostRecord>, RepoError>;

    /// Every post of one author, oldest first.
    async fn list_all_posts_by_author(&self, author_id: &str)
    -> Result<Vec<PostRecord>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    /// Insert a post. Fails with `Duplicate` when the id is already taken.
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    /// Replace the text of a post owned by `params.author_id`.
    ///
    /// Fails with `NotFound` for unknown posts and `Forbidden` when the post
    /// belongs to someone else.
    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;
}

#[async_trait]
pub trait SubscriptionsRepo: Send + Sync {
    /// Record `subscriber -> subscribee` in both indexes. Returns `true` when
    /// the edge did not exist before.
    async fn add_subscription(
        &self,
        subscribee_id: &str,
        subscriber_id: &str,
    ) -> Result<bool, RepoError>;

    /// Users following `user_id`. A user nobody follows yields an empty list.
    async fn list_subscribers(&self, user_id: &str) -> Result<Vec<String>, RepoError>;

    /// Users `user_id` follows.
    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<String>, RepoError>;
}

#[async_trait]
pub trait FeedRepo: Send + Sync {
    /// Newest-first feed page of one subscriber, ordered by surrogate key.
    async fn list_feed(
        &self,
        subscriber_id: &str,
        page: PageRequest,
    ) -> Result<CursorPage<FeedEntryRecord>, RepoError>;
}

#[async_trait]
pub trait FeedWriteRepo: Send + Sync {
    /// Insert or refresh the entry keyed by `(subscriber_id, origin_id)`.
    ///
    /// An existing entry with a newer `last_modified_at` is left untouched.
    /// Returns whether a row was written.
    async fn upsert_feed_entry(&self, entry: &FeedEntryRecord) -> Result<bool, RepoError>;

    /// Refresh every existing copy of `update.origin_id`; never creates
    /// entries. Returns the number of rows written.
    async fn update_feed_entries(&self, update: &FeedContentUpdate) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait FanOutQueue: Send + Sync {
    /// Hand a lifecycle event to the background workers. Returns the job id.
    async fn enqueue(&self, job: FanOutJob) -> Result<String, RepoError>;
}
