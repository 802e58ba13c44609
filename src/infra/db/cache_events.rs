//! Cache coherence over Postgres `LISTEN`/`NOTIFY`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::repos::RepoError;
use crate::cache::{CacheBroadcast, CacheEvent, ObjectCache};
use crate::domain::entities::PostRecord;

use super::map_sqlx_error;

pub const CACHE_CHANNEL: &str = "feedline_cache";

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Publishes post writes on [`CACHE_CHANNEL`].
#[derive(Clone)]
pub struct PostgresCacheBroadcast {
    pool: PgPool,
    origin: String,
}

impl PostgresCacheBroadcast {
    pub fn new(pool: PgPool, origin: impl Into<String>) -> Self {
        Self {
            pool,
            origin: origin.into(),
        }
    }

    pub async fn publish(&self, event: &CacheEvent) -> Result<(), RepoError> {
        let payload = serde_json::to_string(event).map_err(RepoError::from_persistence)?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(CACHE_CHANNEL)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl CacheBroadcast for PostgresCacheBroadcast {
    async fn post_written(&self, post: &PostRecord) {
        let event = CacheEvent::post_written(&self.origin, post);
        if let Err(err) = self.publish(&event).await {
            warn!(
                target = "infra::db::cache_events",
                post_id = %post.id,
                error = %err,
                "failed to publish cache event"
            );
        }
    }
}

/// Subscribe to [`CACHE_CHANNEL`] and apply other processes' writes to `cache`.
///
/// Notifications sent while the listener was disconnected are lost, so the
/// whole cache is cleared on reconnect.
pub async fn spawn_cache_listener(
    pool: &PgPool,
    cache: Arc<ObjectCache>,
    origin: String,
) -> Result<JoinHandle<()>, RepoError> {
    let mut listener = PgListener::connect_with(pool)
        .await
        .map_err(map_sqlx_error)?;
    listener.listen(CACHE_CHANNEL).await.map_err(map_sqlx_error)?;

    Ok(tokio::spawn(async move {
        loop {
            match listener.try_recv().await {
                Ok(Some(notification)) => {
                    match serde_json::from_str::<CacheEvent>(notification.payload()) {
                        Ok(event) => {
                            if event.apply(&origin, &cache) {
                                debug!(
                                    target = "infra::db::cache_events",
                                    post_id = %event.post_id,
                                    author_id = %event.author_id,
                                    "applied remote cache event"
                                );
                            }
                        }
                        Err(err) => warn!(
                            target = "infra::db::cache_events",
                            error = %err,
                            "malformed cache event"
                        ),
                    }
                }
                Ok(None) => {
                    warn!(
                        target = "infra::db::cache_events",
                        "cache listener reconnecting, clearing cache"
                    );
                    cache.clear();
                }
                Err(err) => {
                    warn!(
                        target = "infra::db::cache_events",
                        error = %err,
                        "cache listener error"
                    );
                    cache.clear();
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }))
}
