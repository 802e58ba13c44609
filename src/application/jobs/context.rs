use std::sync::Arc;

use apalis::prelude::Error as ApalisError;

use crate::application::repos::{FeedWriteRepo, PostsRepo, SubscriptionsRepo};

use super::locks::{AuthorLock, AuthorLocks};

/// Shared context passed to fan-out workers.
///
/// `posts` must read the authoritative store, never a cache, so backfills
/// copy current content. `locks` defaults to an in-process registry; swap
/// it with [`FanOutContext::with_locks`] when other processes share the
/// feed store.
#[derive(Clone)]
pub struct FanOutContext {
    pub posts: Arc<dyn PostsRepo>,
    pub subscriptions: Arc<dyn SubscriptionsRepo>,
    pub feed: Arc<dyn FeedWriteRepo>,
    pub locks: Arc<dyn AuthorLock>,
}

impl FanOutContext {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        subscriptions: Arc<dyn SubscriptionsRepo>,
        feed: Arc<dyn FeedWriteRepo>,
    ) -> Self {
        Self {
            posts,
            subscriptions,
            feed,
            locks: Arc::new(AuthorLocks::default()),
        }
    }

    pub fn with_locks(mut self, locks: Arc<dyn AuthorLock>) -> Self {
        self.locks = locks;
        self
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
