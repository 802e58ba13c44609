use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::application::repos::RepoError;

/// Registry size above which idle in-process locks are dropped.
const IDLE_LOCK_LIMIT: usize = 1024;

/// Proof that the caller holds one author's fan-out critical section.
///
/// The section ends when the guard is dropped.
pub struct AuthorGuard {
    _held: Box<dyn Send>,
}

impl AuthorGuard {
    pub fn new(held: impl Send + 'static) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

/// Serializes the read-then-write steps of fan-out per author.
///
/// Every worker that can touch the same feed store must share one
/// implementation: an in-process registry for a single process, a database
/// lock when several processes run workers.
#[async_trait]
pub trait AuthorLock: Send + Sync {
    async fn lock(&self, author_id: &str) -> Result<AuthorGuard, RepoError>;
}

/// Per-author critical sections for fan-out writes within one process.
///
/// Every lifecycle event touching one author's posts takes the same lock, so
/// a backfill and a concurrent edit of that author never interleave their
/// read-then-write steps. Different authors proceed in parallel.
#[derive(Clone, Default)]
pub struct AuthorLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AuthorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, author_id: &str) -> OwnedMutexGuard<()> {
        // The map shard guard is released before awaiting the mutex.
        let lock = self
            .inner
            .entry(author_id.to_string())
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Drop locks nobody currently holds or waits on.
    pub fn prune_idle(&self) {
        self.inner.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl AuthorLock for AuthorLocks {
    async fn lock(&self, author_id: &str) -> Result<AuthorGuard, RepoError> {
        if self.len() > IDLE_LOCK_LIMIT {
            self.prune_idle();
        }
        Ok(AuthorGuard::new(self.acquire(author_id).await))
    }
}
