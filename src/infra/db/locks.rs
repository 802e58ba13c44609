use async_trait::async_trait;
use sqlx::PgPool;

use crate::application::jobs::{AuthorGuard, AuthorLock};
use crate::application::repos::RepoError;

use super::map_sqlx_error;

/// First key of every fan-out advisory lock, keeping them apart from other
/// advisory lock users of the same database.
const FAN_OUT_LOCK_CLASS: i32 = 0x4645;

/// Per-author fan-out lock shared by every process on one database.
///
/// Each guard owns an open transaction holding
/// `pg_advisory_xact_lock(class, hashtext(author_id))`; dropping the guard
/// rolls the transaction back, which releases the lock. Give it a pool of
/// its own so held locks never starve the connections fan-out writes use.
#[derive(Clone)]
pub struct PostgresAuthorLocks {
    pool: PgPool,
}

impl PostgresAuthorLocks {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthorLock for PostgresAuthorLocks {
    async fn lock(&self, author_id: &str) -> Result<AuthorGuard, RepoError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
            .bind(FAN_OUT_LOCK_CLASS)
            .bind(author_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(AuthorGuard::new(tx))
    }
}
