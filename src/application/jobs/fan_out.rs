use std::{sync::Arc, time::Instant};

use apalis::prelude::{Data, Error as ApalisError};
use futures::{StreamExt, TryStreamExt, stream};
use metrics::{counter, histogram};
use tracing::{debug, info};

use crate::application::repos::{FeedContentUpdate, RepoError};
use crate::domain::entities::FeedEntryRecord;

use super::{
    context::{FanOutContext, job_failed},
    payload::{FanOutJob, PostEvent, SubscriptionEvent},
};

/// Concurrent feed writes issued by a single create fan-out.
const ENTRY_WRITE_CONCURRENCY: usize = 16;

/// apalis entry point for the `fan_out` queue.
pub async fn process_fan_out_job(
    job: FanOutJob,
    context: Data<FanOutContext>,
) -> Result<(), ApalisError> {
    context.apply(&job).await.map(|_| ()).map_err(job_failed)
}

impl FanOutContext {
    /// Apply one lifecycle event to the feed store.
    ///
    /// All writes are per-entry upserts, so a retry after partial progress
    /// converges to the same state. Returns the number of entries written.
    pub async fn apply(&self, job: &FanOutJob) -> Result<u64, RepoError> {
        let started = Instant::now();
        let result = match job {
            FanOutJob::PostCreated(event) => self.fan_out_created(event).await,
            FanOutJob::PostModified(event) => self.fan_out_modified(event).await,
            FanOutJob::UserSubscribed(event) => self.backfill_subscription(event).await,
        };

        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!("feedline_fanout_jobs_total", "kind" => job.kind(), "outcome" => outcome)
            .increment(1);
        histogram!("feedline_fanout_ms", "kind" => job.kind())
            .record(started.elapsed().as_secs_f64() * 1000.0);
        if let Ok(written) = &result {
            counter!("feedline_fanout_entries_written_total", "kind" => job.kind())
                .increment(*written);
        }

        result
    }

    async fn fan_out_created(&self, event: &PostEvent) -> Result<u64, RepoError> {
        let subscribers = self
            .subscriptions
            .list_subscribers(&event.author_id)
            .await?;
        if subscribers.is_empty() {
            debug!(
                target = "application::jobs::fan_out",
                post_id = %event.post_id,
                author_id = %event.author_id,
                "author has no subscribers; nothing to fan out"
            );
            return Ok(0);
        }

        let _guard = self.locks.lock(&event.author_id).await?;
        let entries: Vec<FeedEntryRecord> = subscribers
            .iter()
            .map(|subscriber_id| event.feed_entry(subscriber_id))
            .collect();
        let written = stream::iter(entries)
            .map(|entry| {
                let feed = Arc::clone(&self.feed);
                async move { feed.upsert_feed_entry(&entry).await }
            })
            .buffer_unordered(ENTRY_WRITE_CONCURRENCY)
            .try_fold(0u64, |written, inserted| async move {
                Ok(written + u64::from(inserted))
            })
            .await?;

        info!(
            target = "application::jobs::fan_out",
            post_id = %event.post_id,
            author_id = %event.author_id,
            subscribers = subscribers.len(),
            written,
            "post fanned out"
        );
        Ok(written)
    }

    async fn fan_out_modified(&self, event: &PostEvent) -> Result<u64, RepoError> {
        let update = FeedContentUpdate {
            origin_id: event.post_id.clone(),
            text: event.text.clone(),
            last_modified_at: event.last_modified_at,
        };

        let _guard = self.locks.lock(&event.author_id).await?;
        let written = self.feed.update_feed_entries(&update).await?;

        info!(
            target = "application::jobs::fan_out",
            post_id = %event.post_id,
            author_id = %event.author_id,
            written,
            "post edit fanned out"
        );
        Ok(written)
    }

    async fn backfill_subscription(&self, event: &SubscriptionEvent) -> Result<u64, RepoError> {
        let _guard = self.locks.lock(&event.subscribee_id).await?;
        let posts = self
            .posts
            .list_all_posts_by_author(&event.subscribee_id)
            .await?;

        let mut written = 0;
        for post in &posts {
            let entry = FeedEntryRecord::from_post(event.subscriber_id.as_str(), post);
            if self.feed.upsert_feed_entry(&entry).await? {
                written += 1;
            }
        }

        info!(
            target = "application::jobs::fan_out",
            subscribee_id = %event.subscribee_id,
            subscriber_id = %event.subscriber_id,
            posts = posts.len(),
            written,
            "subscription backfilled"
        );
        Ok(written)
    }
}
