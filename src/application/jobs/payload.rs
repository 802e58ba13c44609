//! Lifecycle message contract between the request path and fan-out workers.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::entities::{FeedEntryRecord, PostRecord};

/// Post content carried by `create` and `modify` messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEvent {
    pub post_id: String,
    pub author_id: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified_at: OffsetDateTime,
    pub origin_key: i64,
}

impl PostEvent {
    pub fn feed_entry(&self, subscriber_id: &str) -> FeedEntryRecord {
        FeedEntryRecord {
            subscriber_id: subscriber_id.to_string(),
            origin_id: self.post_id.clone(),
            author_id: self.author_id.clone(),
            text: self.text.clone(),
            created_at: self.created_at,
            last_modified_at: self.last_modified_at,
            surrogate_key: self.origin_key,
        }
    }
}

impl From<&PostRecord> for PostEvent {
    fn from(post: &PostRecord) -> Self {
        Self {
            post_id: post.id.clone(),
            author_id: post.author_id.clone(),
            text: post.text.clone(),
            created_at: post.created_at,
            last_modified_at: post.last_modified_at,
            origin_key: post.origin_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEvent {
    pub subscribee_id: String,
    pub subscriber_id: String,
}

/// A lifecycle event, decoded once when it leaves the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FanOutJob {
    #[serde(rename = "create")]
    PostCreated(PostEvent),
    #[serde(rename = "modify")]
    PostModified(PostEvent),
    #[serde(rename = "subscribe")]
    UserSubscribed(SubscriptionEvent),
}

impl FanOutJob {
    pub fn post_created(post: &PostRecord) -> Self {
        Self::PostCreated(PostEvent::from(post))
    }

    pub fn post_modified(post: &PostRecord) -> Self {
        Self::PostModified(PostEvent::from(post))
    }

    pub fn user_subscribed(subscribee_id: &str, subscriber_id: &str) -> Self {
        Self::UserSubscribed(SubscriptionEvent {
            subscribee_id: subscribee_id.to_string(),
            subscriber_id: subscriber_id.to_string(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PostCreated(_) => "create",
            Self::PostModified(_) => "modify",
            Self::UserSubscribed(_) => "subscribe",
        }
    }

    /// Author whose fan-out critical section this event runs in.
    pub fn author_scope(&self) -> &str {
        match self {
            Self::PostCreated(event) | Self::PostModified(event) => &event.author_id,
            Self::UserSubscribed(event) => &event.subscribee_id,
        }
    }
}
