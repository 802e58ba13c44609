#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use feedline::application::jobs::{FanOutContext, LocalFanOutQueue, LocalQueueOptions};
use feedline::cache::{CacheConfig, CacheLayer, ObjectCache};
use feedline::infra::http::{self, HttpState};
use feedline::infra::memory::InMemoryRepositories;

/// In-memory deployment with an in-process fan-out queue.
pub struct Harness {
    pub repos: Arc<InMemoryRepositories>,
    pub queue: LocalFanOutQueue,
    pub cache: Option<Arc<ObjectCache>>,
    pub state: HttpState,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Some(Arc::new(ObjectCache::new(&CacheConfig::default()))))
    }

    pub fn without_cache() -> Self {
        Self::build(None)
    }

    fn build(cache: Option<Arc<ObjectCache>>) -> Self {
        let repos = Arc::new(InMemoryRepositories::new());
        let context = FanOutContext::new(repos.clone(), repos.clone(), repos.clone());
        let (queue, _workers) = LocalFanOutQueue::spawn(
            context,
            LocalQueueOptions {
                concurrency: 4,
                max_attempts: 3,
                retry_backoff: Duration::from_millis(1),
            },
        );

        let state = HttpState::from_stores(
            repos.clone(),
            repos.clone(),
            repos.clone(),
            repos.clone(),
            Arc::new(queue.clone()),
            cache.clone().map(CacheLayer::local),
        );

        Self {
            repos,
            queue,
            cache,
            state,
        }
    }

    pub fn router(&self) -> Router {
        http::build_router(self.state.clone())
    }

    /// Wait until every enqueued fan-out job has been applied.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.queue.wait_idle())
            .await
            .expect("fan-out queue drained");
    }
}
