mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use feedline::application::jobs::{FanOutContext, LocalFanOutQueue, LocalQueueOptions};
use feedline::application::pagination::{CursorPage, PageRequest};
use feedline::application::repos::{
    CreatePostParams, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use feedline::cache::{
    CacheBroadcast, CacheConfig, CacheEvent, CacheLayer, CachedPostsRepo, ListingKey,
    ListingScope, ObjectCache,
};
use feedline::domain::entities::PostRecord;
use feedline::infra::http::HttpState;
use feedline::infra::memory::InMemoryRepositories;
use time::OffsetDateTime;
use tokio::sync::Notify;

use common::Harness;

/// Posts reader whose next read pauses after loading from the store.
struct PausingReader {
    inner: Arc<InMemoryRepositories>,
    armed: AtomicBool,
    read_done: Notify,
    release: Notify,
}

impl PausingReader {
    fn new(inner: Arc<InMemoryRepositories>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            read_done: Notify::new(),
            release: Notify::new(),
        }
    }

    async fn pause_if_armed(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.read_done.notify_one();
            self.release.notified().await;
        }
    }
}

#[async_trait]
impl PostsRepo for PausingReader {
    async fn find_post_by_id(&self, id: &str) -> Result<Option<PostRecord>, RepoError> {
        let post = self.inner.find_post_by_id(id).await?;
        self.pause_if_armed().await;
        Ok(post)
    }

    async fn list_posts_by_author(
        &self,
        author_id: &str,
        page: PageRequest,
    ) -> Result<CursorPage<PostRecord>, RepoError> {
        let result = self.inner.list_posts_by_author(author_id, page).await?;
        self.pause_if_armed().await;
        Ok(result)
    }

    async fn list_all_posts_by_author(
        &self,
        author_id: &str,
    ) -> Result<Vec<PostRecord>, RepoError> {
        self.inner.list_all_posts_by_author(author_id).await
    }
}

fn create_params(id: &str, text: &str) -> CreatePostParams {
    CreatePostParams {
        id: id.to_string(),
        author_id: "a1".to_string(),
        text: text.to_string(),
        created_at: OffsetDateTime::now_utc(),
    }
}

#[tokio::test]
async fn get_post_never_returns_pre_modification_content() {
    let harness = Harness::new();
    let posts = &harness.state.posts;
    let post = posts.create_post("a1", "hello".into()).await.expect("create");

    assert_eq!(posts.get_post(&post.id).await.expect("get").text, "hello");
    posts
        .modify_post("a1", &post.id, "world".into())
        .await
        .expect("modify");
    assert_eq!(posts.get_post(&post.id).await.expect("get").text, "world");
}

#[tokio::test]
async fn created_post_is_served_from_cache() {
    let harness = Harness::new();
    let post = harness
        .state
        .posts
        .create_post("a1", "hello".into())
        .await
        .expect("create");

    let cache = harness.cache.as_ref().expect("cache enabled");
    assert_eq!(cache.get_post(&post.id).map(|p| p.text), Some("hello".into()));
}

#[tokio::test]
async fn timeline_listing_is_invalidated_by_author_writes() {
    let harness = Harness::new();
    let posts = &harness.state.posts;
    let cache = harness.cache.as_ref().expect("cache enabled");

    let first = posts.create_post("a1", "one".into()).await.expect("create");
    let page = posts.list_posts("a1", None, None).await.expect("list");
    assert_eq!(page.items.len(), 1);

    let key = ListingKey::new(ListingScope::Timeline, "a1", &PageRequest::first(10));
    assert!(cache.get_post_list(&key).is_some());

    posts.create_post("a1", "two".into()).await.expect("create");
    assert!(cache.get_post_list(&key).is_none());
    let page = posts.list_posts("a1", None, None).await.expect("list");
    assert_eq!(page.items.len(), 2);

    posts
        .modify_post("a1", &first.id, "uno".into())
        .await
        .expect("modify");
    let page = posts.list_posts("a1", None, None).await.expect("list");
    assert_eq!(page.items[1].text, "uno");
}

#[tokio::test]
async fn other_authors_listings_survive_a_write() {
    let harness = Harness::new();
    let posts = &harness.state.posts;
    let cache = harness.cache.as_ref().expect("cache enabled");

    posts.create_post("b2", "theirs".into()).await.expect("create");
    posts.list_posts("b2", None, None).await.expect("list");
    posts.create_post("a1", "mine".into()).await.expect("create");

    let key = ListingKey::new(ListingScope::Timeline, "b2", &PageRequest::first(10));
    assert!(cache.get_post_list(&key).is_some());
}

#[tokio::test]
async fn cached_feed_page_may_lag_fan_out_until_expiry() {
    let harness = Harness::new();
    harness
        .state
        .subscriptions
        .subscribe("a1", "b2")
        .await
        .expect("subscribe");
    harness.settle().await;

    let empty = harness
        .state
        .feed
        .list_feed("b2", None, None)
        .await
        .expect("feed");
    assert!(empty.items.is_empty());

    harness
        .state
        .posts
        .create_post("a1", "hello".into())
        .await
        .expect("create");
    harness.settle().await;

    let cached = harness
        .state
        .feed
        .list_feed("b2", None, None)
        .await
        .expect("feed");
    assert!(cached.items.is_empty());

    harness.cache.as_ref().expect("cache enabled").clear();
    let fresh = harness
        .state
        .feed
        .list_feed("b2", None, None)
        .await
        .expect("feed");
    assert_eq!(fresh.items.len(), 1);
}

#[tokio::test]
async fn failed_writes_leave_the_cache_untouched() {
    let harness = Harness::new();
    let posts = &harness.state.posts;
    let post = posts.create_post("a1", "hello".into()).await.expect("create");

    posts
        .modify_post("b2", &post.id, "hijack".into())
        .await
        .expect_err("not the author");
    assert_eq!(posts.get_post(&post.id).await.expect("get").text, "hello");
}

#[tokio::test]
async fn slow_read_does_not_overwrite_a_newer_write() {
    let store = Arc::new(InMemoryRepositories::new());
    let reader = Arc::new(PausingReader::new(store.clone()));
    let cache = Arc::new(ObjectCache::new(&CacheConfig::default()));
    let repo = Arc::new(CachedPostsRepo::new(
        reader.clone(),
        store.clone(),
        CacheLayer::local(cache.clone()),
    ));

    let created = repo
        .create_post(create_params("p1", "hello"))
        .await
        .expect("create");
    cache.clear();

    reader.armed.store(true, Ordering::SeqCst);
    let slow = tokio::spawn({
        let repo = repo.clone();
        async move { repo.find_post_by_id("p1").await }
    });
    reader.read_done.notified().await;

    repo.update_post(UpdatePostParams {
        id: "p1".to_string(),
        author_id: "a1".to_string(),
        text: "world".to_string(),
        last_modified_at: created.last_modified_at + time::Duration::seconds(1),
    })
    .await
    .expect("update");

    reader.release.notify_one();
    let stale = slow.await.expect("join").expect("read").expect("post");
    assert_eq!(stale.text, "hello");

    let current = repo
        .find_post_by_id("p1")
        .await
        .expect("read")
        .expect("post");
    assert_eq!(current.text, "world");
}

#[tokio::test]
async fn slow_timeline_read_does_not_survive_a_new_post() {
    let store = Arc::new(InMemoryRepositories::new());
    let reader = Arc::new(PausingReader::new(store.clone()));
    let cache = Arc::new(ObjectCache::new(&CacheConfig::default()));
    let repo = Arc::new(CachedPostsRepo::new(
        reader.clone(),
        store.clone(),
        CacheLayer::local(cache.clone()),
    ));
    repo.create_post(create_params("p1", "one"))
        .await
        .expect("create");

    reader.armed.store(true, Ordering::SeqCst);
    let slow = tokio::spawn({
        let repo = repo.clone();
        async move { repo.list_posts_by_author("a1", PageRequest::first(10)).await }
    });
    reader.read_done.notified().await;

    repo.create_post(create_params("p2", "two"))
        .await
        .expect("create");
    reader.release.notify_one();
    let stale = slow.await.expect("join").expect("list");
    assert_eq!(stale.items.len(), 1);

    let page = repo
        .list_posts_by_author("a1", PageRequest::first(10))
        .await
        .expect("list");
    assert_eq!(page.items.len(), 2);
}

/// Delivers events to the peers' caches the way a shared channel would.
#[derive(Default)]
struct InProcessBroadcast {
    origin: String,
    peers: std::sync::Mutex<Vec<(String, Arc<ObjectCache>)>>,
}

#[async_trait]
impl CacheBroadcast for InProcessBroadcast {
    async fn post_written(&self, post: &PostRecord) {
        let event = CacheEvent::post_written(&self.origin, post);
        let peers = self.peers.lock().expect("peers").clone();
        for (origin, cache) in peers {
            event.apply(&origin, &cache);
        }
    }
}

fn replica(
    store: &Arc<InMemoryRepositories>,
    origin: &str,
) -> (HttpState, Arc<ObjectCache>, Arc<InProcessBroadcast>) {
    let context = FanOutContext::new(store.clone(), store.clone(), store.clone());
    let (queue, _workers) = LocalFanOutQueue::spawn(
        context,
        LocalQueueOptions {
            concurrency: 1,
            max_attempts: 1,
            retry_backoff: Duration::from_millis(1),
        },
    );
    let cache = Arc::new(ObjectCache::new(&CacheConfig::default()));
    let broadcast = Arc::new(InProcessBroadcast {
        origin: origin.to_string(),
        ..Default::default()
    });
    let state = HttpState::from_stores(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(queue),
        Some(CacheLayer::local(cache.clone()).with_broadcast(broadcast.clone())),
    );
    (state, cache, broadcast)
}

#[tokio::test]
async fn edit_on_one_replica_is_visible_on_another() {
    let store = Arc::new(InMemoryRepositories::new());
    let (left, left_cache, left_broadcast) = replica(&store, "left");
    let (right, right_cache, right_broadcast) = replica(&store, "right");
    left_broadcast
        .peers
        .lock()
        .expect("peers")
        .push(("right".to_string(), right_cache));
    right_broadcast
        .peers
        .lock()
        .expect("peers")
        .push(("left".to_string(), left_cache));

    let post = left
        .posts
        .create_post("a1", "hello".into())
        .await
        .expect("create");
    assert_eq!(right.posts.get_post(&post.id).await.expect("get").text, "hello");
    assert_eq!(
        right.posts.list_posts("a1", None, None).await.expect("list").items.len(),
        1
    );

    left.posts
        .modify_post("a1", &post.id, "world".into())
        .await
        .expect("modify");
    left.posts
        .create_post("a1", "again".into())
        .await
        .expect("create");

    assert_eq!(right.posts.get_post(&post.id).await.expect("get").text, "world");
    assert_eq!(
        right.posts.list_posts("a1", None, None).await.expect("list").items.len(),
        2
    );
}
