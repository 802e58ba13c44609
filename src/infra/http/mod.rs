//! Public JSON API.

mod handlers;
mod identity;
mod middleware;
mod models;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::{
    feed::FeedService,
    posts::PostService,
    repos::{FanOutQueue, FeedRepo, PostsRepo, PostsWriteRepo, SubscriptionsRepo},
    subscriptions::SubscriptionService,
};
use crate::cache::{CacheLayer, CachedFeedRepo, CachedPostsRepo};

pub use identity::USER_ID_HEADER;
pub use middleware::RequestContext;
pub use models::{PostPageResponse, PostView, UsersResponse};

#[derive(Clone)]
pub struct HttpState {
    pub posts: Arc<PostService>,
    pub subscriptions: Arc<SubscriptionService>,
    pub feed: Arc<FeedService>,
}

impl HttpState {
    /// Wire the services over the given stores, putting the object cache in
    /// front of post and feed reads when one is supplied.
    pub fn from_stores(
        posts_reader: Arc<dyn PostsRepo>,
        posts_writer: Arc<dyn PostsWriteRepo>,
        subscriptions: Arc<dyn SubscriptionsRepo>,
        feed: Arc<dyn FeedRepo>,
        queue: Arc<dyn FanOutQueue>,
        cache: Option<CacheLayer>,
    ) -> Self {
        let (posts_reader, posts_writer, feed): (
            Arc<dyn PostsRepo>,
            Arc<dyn PostsWriteRepo>,
            Arc<dyn FeedRepo>,
        ) = match cache {
            Some(cache) => {
                let feed = Arc::new(CachedFeedRepo::new(feed, cache.store.clone()));
                let posts = Arc::new(CachedPostsRepo::new(posts_reader, posts_writer, cache));
                (
                    posts.clone() as Arc<dyn PostsRepo>,
                    posts as Arc<dyn PostsWriteRepo>,
                    feed as Arc<dyn FeedRepo>,
                )
            }
            None => (posts_reader, posts_writer, feed),
        };

        Self {
            posts: Arc::new(PostService::new(posts_reader, posts_writer, queue.clone())),
            subscriptions: Arc::new(SubscriptionService::new(subscriptions, queue)),
            feed: Arc::new(FeedService::new(feed)),
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/v1/posts", post(handlers::create_post))
        .route(
            "/api/v1/posts/{post_id}",
            get(handlers::get_post).patch(handlers::modify_post),
        )
        .route("/api/v1/users/{user_id}/posts", get(handlers::list_user_posts))
        .route("/api/v1/users/{user_id}/subscribe", post(handlers::subscribe))
        .route("/api/v1/subscriptions", get(handlers::list_subscriptions))
        .route("/api/v1/subscribers", get(handlers::list_subscribers))
        .route("/api/v1/feed", get(handlers::list_feed))
        .route("/_health", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}
