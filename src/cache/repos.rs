//! Repository decorators that put the object cache in front of the stores.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::application::pagination::{CursorPage, PageRequest};
use crate::application::repos::{
    CreatePostParams, FeedRepo, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::{FeedEntryRecord, PostRecord};

use super::broadcast::{CacheBroadcast, CacheLayer};
use super::keys::{ListingKey, ListingScope};
use super::store::ObjectCache;

/// Read-through, write-invalidated post repository.
///
/// Writes go to the wrapped store first; the cache is touched only after the
/// store commits, so a failed write never leaves cache state behind.
/// Read-through fills are versioned against writes, see [`ObjectCache::fill_post`].
#[derive(Clone)]
pub struct CachedPostsRepo {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    cache: Arc<ObjectCache>,
    broadcast: Option<Arc<dyn CacheBroadcast>>,
}

impl CachedPostsRepo {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        layer: CacheLayer,
    ) -> Self {
        Self {
            reader,
            writer,
            cache: layer.store,
            broadcast: layer.broadcast,
        }
    }

    async fn publish(&self, post: &PostRecord) {
        if let Some(broadcast) = &self.broadcast {
            broadcast.post_written(post).await;
        }
    }
}

#[async_trait]
impl PostsRepo for CachedPostsRepo {
    async fn find_post_by_id(&self, id: &str) -> Result<Option<PostRecord>, RepoError> {
        if let Some(post) = self.cache.get_post(id) {
            return Ok(Some(post));
        }

        let generation = self.cache.post_generation(id);
        let post = self.reader.find_post_by_id(id).await?;
        if let Some(post) = &post
            && !self.cache.fill_post(post.clone(), generation)
        {
            debug!(target = "cache::repos", post_id = %id, "stale post fill skipped");
        }
        Ok(post)
    }

    async fn list_posts_by_author(
        &self,
        author_id: &str,
        page: PageRequest,
    ) -> Result<CursorPage<PostRecord>, RepoError> {
        let key = ListingKey::new(ListingScope::Timeline, author_id, &page);
        if let Some(cached) = self.cache.get_post_list(&key) {
            return Ok(cached);
        }

        let generation = self.cache.listing_generation(ListingScope::Timeline, author_id);
        let result = self.reader.list_posts_by_author(author_id, page).await?;
        self.cache.fill_post_list(&key, result.clone(), generation);
        Ok(result)
    }

    async fn list_all_posts_by_author(
        &self,
        author_id: &str,
    ) -> Result<Vec<PostRecord>, RepoError> {
        self.reader.list_all_posts_by_author(author_id).await
    }
}

#[async_trait]
impl PostsWriteRepo for CachedPostsRepo {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let post = self.writer.create_post(params).await?;

        let dropped = self
            .cache
            .invalidate_listings(ListingScope::Timeline, &post.author_id);
        self.cache.set_post(post.clone());
        debug!(
            target = "cache::repos",
            post_id = %post.id,
            author_id = %post.author_id,
            dropped,
            "cache refreshed after create"
        );
        self.publish(&post).await;
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let post = self.writer.update_post(params).await?;

        self.cache.set_post(post.clone());
        let dropped = self
            .cache
            .invalidate_listings(ListingScope::Timeline, &post.author_id);
        debug!(
            target = "cache::repos",
            post_id = %post.id,
            author_id = %post.author_id,
            dropped,
            "cache refreshed after modify"
        );
        self.publish(&post).await;
        Ok(post)
    }
}

/// Read-through feed repository.
///
/// Fan-out does not invalidate these pages; a cached feed page may lag the
/// feed store by up to the cache TTL.
#[derive(Clone)]
pub struct CachedFeedRepo {
    inner: Arc<dyn FeedRepo>,
    cache: Arc<ObjectCache>,
}

impl CachedFeedRepo {
    pub fn new(inner: Arc<dyn FeedRepo>, cache: Arc<ObjectCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl FeedRepo for CachedFeedRepo {
    async fn list_feed(
        &self,
        subscriber_id: &str,
        page: PageRequest,
    ) -> Result<CursorPage<FeedEntryRecord>, RepoError> {
        let key = ListingKey::new(ListingScope::Feed, subscriber_id, &page);
        if let Some(cached) = self.cache.get_feed_list(&key) {
            return Ok(cached);
        }

        let result = self.inner.list_feed(subscriber_id, page).await?;
        self.cache.set_feed_list(&key, result.clone());
        Ok(result)
    }
}
