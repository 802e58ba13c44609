use async_trait::async_trait;

use crate::application::repos::{RepoError, SubscriptionsRepo};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl SubscriptionsRepo for PostgresRepositories {
    async fn add_subscription(
        &self,
        subscribee_id: &str,
        subscriber_id: &str,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (subscribee_id, subscriber_id)
            VALUES ($1, $2)
            ON CONFLICT (subscribee_id, subscriber_id) DO NOTHING
            "#,
        )
        .bind(subscribee_id)
        .bind(subscriber_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_subscribers(&self, user_id: &str) -> Result<Vec<String>, RepoError> {
        sqlx::query_scalar(
            r#"
            SELECT subscriber_id
            FROM subscriptions
            WHERE subscribee_id = $1
            ORDER BY created_at, subscriber_id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<String>, RepoError> {
        sqlx::query_scalar(
            r#"
            SELECT subscribee_id
            FROM subscriptions
            WHERE subscriber_id = $1
            ORDER BY created_at, subscribee_id
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}
