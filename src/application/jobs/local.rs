//! In-process fan-out queue for single-node deployments.
//!
//! Jobs travel over an unbounded channel to a fixed pool of worker tasks.
//! Failed jobs are re-sent after a backoff until `max_attempts` is reached.

use std::sync::{
    Arc,
    atomic::{AtomicU64, AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use metrics::gauge;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::application::repos::{FanOutQueue, RepoError};

use super::{context::FanOutContext, payload::FanOutJob};

const DEFAULT_CONCURRENCY: usize = 10;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct LocalQueueOptions {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for LocalQueueOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

struct QueuedJob {
    id: String,
    job: FanOutJob,
    attempt: u32,
}

#[derive(Default)]
struct QueueState {
    pending: AtomicUsize,
    idle: Notify,
    next_id: AtomicU64,
}

impl QueueState {
    fn accept(&self) {
        let pending = self.pending.fetch_add(1, Ordering::AcqRel) + 1;
        gauge!("feedline_fanout_local_pending").set(pending as f64);
    }

    fn finish(&self) {
        let previous = self.pending.fetch_sub(1, Ordering::AcqRel);
        gauge!("feedline_fanout_local_pending").set(previous.saturating_sub(1) as f64);
        if previous == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Sending half of the in-process queue. Workers stop once every clone is dropped.
#[derive(Clone)]
pub struct LocalFanOutQueue {
    sender: mpsc::UnboundedSender<QueuedJob>,
    state: Arc<QueueState>,
}

impl LocalFanOutQueue {
    pub fn spawn(
        context: FanOutContext,
        options: LocalQueueOptions,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let state = Arc::new(QueueState::default());

        let workers = (0..options.concurrency.max(1))
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    context.clone(),
                    options.clone(),
                    receiver.clone(),
                    sender.downgrade(),
                    state.clone(),
                ))
            })
            .collect();

        (Self { sender, state }, workers)
    }

    /// Jobs accepted but not yet finished, including those waiting for a retry.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Resolve once every accepted job has finished or been abandoned.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl FanOutQueue for LocalFanOutQueue {
    async fn enqueue(&self, job: FanOutJob) -> Result<String, RepoError> {
        let id = format!(
            "local-{}",
            self.state.next_id.fetch_add(1, Ordering::Relaxed)
        );
        self.state.accept();

        let queued = QueuedJob {
            id: id.clone(),
            job,
            attempt: 1,
        };
        if self.sender.send(queued).is_err() {
            self.state.finish();
            return Err(RepoError::from_persistence("fan-out workers have stopped"));
        }
        Ok(id)
    }
}

async fn run_worker(
    worker: usize,
    context: FanOutContext,
    options: LocalQueueOptions,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<QueuedJob>>>,
    retry_sender: mpsc::WeakUnboundedSender<QueuedJob>,
    state: Arc<QueueState>,
) {
    loop {
        let next = { receiver.lock().await.recv().await };
        let Some(queued) = next else {
            debug!(
                target = "application::jobs::local",
                worker, "fan-out worker stopping"
            );
            return;
        };

        match context.apply(&queued.job).await {
            Ok(written) => {
                debug!(
                    target = "application::jobs::local",
                    worker,
                    job_id = %queued.id,
                    kind = queued.job.kind(),
                    written,
                    "fan-out job finished"
                );
                state.finish();
            }
            Err(err) if queued.attempt < options.max_attempts => {
                warn!(
                    target = "application::jobs::local",
                    worker,
                    job_id = %queued.id,
                    kind = queued.job.kind(),
                    attempt = queued.attempt,
                    error = %err,
                    "fan-out job failed; retrying"
                );
                schedule_retry(
                    queued,
                    options.retry_backoff,
                    retry_sender.clone(),
                    state.clone(),
                );
            }
            Err(err) => {
                error!(
                    target = "application::jobs::local",
                    worker,
                    job_id = %queued.id,
                    kind = queued.job.kind(),
                    attempt = queued.attempt,
                    error = %err,
                    "fan-out job abandoned after final attempt"
                );
                state.finish();
            }
        }
    }
}

fn schedule_retry(
    queued: QueuedJob,
    backoff: Duration,
    sender: mpsc::WeakUnboundedSender<QueuedJob>,
    state: Arc<QueueState>,
) {
    let delay = backoff * queued.attempt;
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let retry = QueuedJob {
            attempt: queued.attempt + 1,
            ..queued
        };
        let delivered = match sender.upgrade() {
            Some(sender) => sender.send(retry).is_ok(),
            None => false,
        };
        if !delivered {
            state.finish();
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use time::OffsetDateTime;

    use super::*;
    use crate::application::pagination::PageRequest;
    use crate::application::repos::{
        CreatePostParams, FeedContentUpdate, FeedRepo, FeedWriteRepo, PostsWriteRepo,
        SubscriptionsRepo,
    };
    use crate::domain::entities::FeedEntryRecord;
    use crate::infra::memory::InMemoryRepositories;

    /// Fails the first `failures` upserts, then delegates.
    struct FlakyFeed {
        inner: Arc<InMemoryRepositories>,
        failures: AtomicU32,
    }

    #[async_trait]
    impl FeedWriteRepo for FlakyFeed {
        async fn upsert_feed_entry(&self, entry: &FeedEntryRecord) -> Result<bool, RepoError> {
            let left = self.failures.load(Ordering::Acquire);
            if left > 0 {
                self.failures.store(left - 1, Ordering::Release);
                return Err(RepoError::Timeout);
            }
            self.inner.upsert_feed_entry(entry).await
        }

        async fn update_feed_entries(&self, update: &FeedContentUpdate) -> Result<u64, RepoError> {
            self.inner.update_feed_entries(update).await
        }
    }

    fn options(max_attempts: u32) -> LocalQueueOptions {
        LocalQueueOptions {
            concurrency: 2,
            max_attempts,
            retry_backoff: Duration::from_millis(1),
        }
    }

    async fn seed(repos: &InMemoryRepositories) -> FanOutJob {
        repos.add_subscription("a1", "b2").await.expect("subscribe");
        let post = repos
            .create_post(CreatePostParams {
                id: "p1".into(),
                author_id: "a1".into(),
                text: "hello".into(),
                created_at: OffsetDateTime::now_utc(),
            })
            .await
            .expect("create post");
        FanOutJob::post_created(&post)
    }

    fn context(repos: &Arc<InMemoryRepositories>, failures: u32) -> FanOutContext {
        let feed = FlakyFeed {
            inner: repos.clone(),
            failures: AtomicU32::new(failures),
        };
        FanOutContext::new(repos.clone(), repos.clone(), Arc::new(feed))
    }

    #[tokio::test]
    async fn failed_jobs_are_retried_until_they_succeed() {
        let repos = Arc::new(InMemoryRepositories::new());
        let job = seed(&repos).await;
        let (queue, _workers) = LocalFanOutQueue::spawn(context(&repos, 2), options(5));

        queue.enqueue(job).await.expect("enqueue");
        queue.wait_idle().await;

        let feed = repos
            .list_feed("b2", PageRequest::first(10))
            .await
            .expect("feed");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn jobs_are_abandoned_after_the_last_attempt() {
        let repos = Arc::new(InMemoryRepositories::new());
        let job = seed(&repos).await;
        let (queue, _workers) = LocalFanOutQueue::spawn(context(&repos, 10), options(3));

        queue.enqueue(job).await.expect("enqueue");
        queue.wait_idle().await;

        let feed = repos
            .list_feed("b2", PageRequest::first(10))
            .await
            .expect("feed");
        assert!(feed.items.is_empty());
    }

    #[tokio::test]
    async fn job_ids_are_unique() {
        let repos = Arc::new(InMemoryRepositories::new());
        let (queue, _workers) = LocalFanOutQueue::spawn(context(&repos, 0), options(1));

        let first = queue
            .enqueue(FanOutJob::user_subscribed("a1", "b2"))
            .await
            .expect("enqueue");
        let second = queue
            .enqueue(FanOutJob::user_subscribed("a1", "c3"))
            .await
            .expect("enqueue");
        assert_ne!(first, second);
        queue.wait_idle().await;
    }
}
