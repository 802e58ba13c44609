use std::sync::Arc;

use tracing::{debug, info};

use crate::application::error::ServiceError;
use crate::application::jobs::{FanOutJob, emit_lifecycle_event};
use crate::application::repos::{FanOutQueue, SubscriptionsRepo};

#[derive(Clone)]
pub struct SubscriptionService {
    repo: Arc<dyn SubscriptionsRepo>,
    queue: Arc<dyn FanOutQueue>,
}

impl SubscriptionService {
    pub fn new(repo: Arc<dyn SubscriptionsRepo>, queue: Arc<dyn FanOutQueue>) -> Self {
        Self { repo, queue }
    }

    /// Make `subscriber_id` follow `subscribee_id`.
    ///
    /// Repeating a subscription is a no-op; only a new edge triggers a
    /// backfill of the subscribee's posts.
    pub async fn subscribe(
        &self,
        subscribee_id: &str,
        subscriber_id: &str,
    ) -> Result<(), ServiceError> {
        if subscribee_id == subscriber_id {
            return Err(ServiceError::InvalidSubscribe(subscriber_id.to_string()));
        }

        let created = self
            .repo
            .add_subscription(subscribee_id, subscriber_id)
            .await?;
        if !created {
            debug!(
                target = "application::subscriptions",
                subscribee_id, subscriber_id, "subscription already exists"
            );
            return Ok(());
        }

        info!(
            target = "application::subscriptions",
            subscribee_id, subscriber_id, "subscription added"
        );
        emit_lifecycle_event(
            self.queue.as_ref(),
            FanOutJob::user_subscribed(subscribee_id, subscriber_id),
        )
        .await;
        Ok(())
    }

    pub async fn list_subscribers(&self, user_id: &str) -> Result<Vec<String>, ServiceError> {
        Ok(self.repo.list_subscribers(user_id).await?)
    }

    pub async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<String>, ServiceError> {
        Ok(self.repo.list_subscriptions(user_id).await?)
    }
}
