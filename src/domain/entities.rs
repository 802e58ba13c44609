//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Authoritative post as stored by the post store.
///
/// `origin_key` is assigned by the store on insert and strictly increases
/// with creation order. It positions the post in its author's timeline and
/// doubles as the surrogate key of every feed copy of the post.
///
/// The Postgres store draws `origin_key` from a sequence before commit, so
/// inserts can become visible out of key order: a reader that already paged
/// past a key may miss a post that commits later with a lower one. Timelines
/// are eventually consistent in that window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: String,
    pub author_id: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified_at: OffsetDateTime,
    pub origin_key: i64,
}

/// Denormalized copy of a post scoped to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntryRecord {
    pub subscriber_id: String,
    pub origin_id: String,
    pub author_id: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified_at: OffsetDateTime,
    pub surrogate_key: i64,
}

impl FeedEntryRecord {
    pub fn from_post(subscriber_id: impl Into<String>, post: &PostRecord) -> Self {
        Self {
            subscriber_id: subscriber_id.into(),
            origin_id: post.id.clone(),
            author_id: post.author_id.clone(),
            text: post.text.clone(),
            created_at: post.created_at,
            last_modified_at: post.last_modified_at,
            surrogate_key: post.origin_key,
        }
    }

    /// Whether `self` may overwrite an entry currently holding `existing`.
    ///
    /// Older content never replaces newer content, so redelivered or
    /// reordered events converge on the latest edit.
    pub fn supersedes(&self, existing: &FeedEntryRecord) -> bool {
        self.last_modified_at >= existing.last_modified_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn post() -> PostRecord {
        PostRecord {
            id: "abcDEF123_".to_string(),
            author_id: "a1".to_string(),
            text: "hello".to_string(),
            created_at: datetime!(2024-05-01 10:00 UTC),
            last_modified_at: datetime!(2024-05-01 10:00 UTC),
            origin_key: 7,
        }
    }

    #[test]
    fn feed_entry_copies_post_and_uses_origin_key_as_surrogate() {
        let entry = FeedEntryRecord::from_post("b2", &post());
        assert_eq!(entry.subscriber_id, "b2");
        assert_eq!(entry.origin_id, "abcDEF123_");
        assert_eq!(entry.author_id, "a1");
        assert_eq!(entry.surrogate_key, 7);
    }

    #[test]
    fn older_content_does_not_supersede_newer() {
        let original = FeedEntryRecord::from_post("b2", &post());
        let mut edited = original.clone();
        edited.text = "world".to_string();
        edited.last_modified_at = datetime!(2024-05-01 11:00 UTC);

        assert!(edited.supersedes(&original));
        assert!(!original.supersedes(&edited));
        assert!(original.supersedes(&original));
    }
}
