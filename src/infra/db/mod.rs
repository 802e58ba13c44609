//! Postgres-backed repository implementations.

mod cache_events;
mod feed;
mod jobs;
mod locks;
mod posts;
mod subscriptions;
mod util;

pub use cache_events::{CACHE_CHANNEL, PostgresCacheBroadcast, spawn_cache_listener};
pub use jobs::{NewJobRecord, PostgresFanOutQueue};
pub use locks::PostgresAuthorLocks;
pub use util::map_sqlx_error;

use std::sync::Arc;

use apalis_sql::postgres::PostgresStorage;
use sqlx::postgres::{PgPool, PgPoolOptions};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    /// Apply the feed schema and the apalis job tables.
    ///
    /// Both migrators share `_sqlx_migrations`, so each ignores the other's versions.
    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        let mut feed = sqlx::migrate!("./migrations");
        feed.set_ignore_missing(true);
        feed.run(pool).await?;

        let mut jobs = PostgresStorage::migrations();
        jobs.set_ignore_missing(true);
        jobs.run(pool).await.map_err(Into::into)
    }
}
