//! Cross-process cache coherence.
//!
//! Each process caches independently. After a post write commits, the
//! writing process publishes a [`CacheEvent`]; every other process applies
//! it to its own [`ObjectCache`], dropping the stale post and the author's
//! timeline pages.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::entities::PostRecord;

use super::keys::ListingScope;
use super::store::ObjectCache;

/// Notice that a post changed in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEvent {
    /// Process that wrote the post; it already refreshed its own cache.
    pub origin: String,
    pub post_id: String,
    pub author_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified_at: OffsetDateTime,
}

impl CacheEvent {
    pub fn post_written(origin: &str, post: &PostRecord) -> Self {
        Self {
            origin: origin.to_string(),
            post_id: post.id.clone(),
            author_id: post.author_id.clone(),
            last_modified_at: post.last_modified_at,
        }
    }

    /// Apply a write made elsewhere. Returns false for events this process published.
    pub fn apply(&self, local_origin: &str, cache: &ObjectCache) -> bool {
        if self.origin == local_origin {
            return false;
        }
        cache.invalidate_post(&self.post_id);
        cache.invalidate_listings(ListingScope::Timeline, &self.author_id);
        true
    }
}

/// Publishes post writes to the other processes sharing the store.
///
/// Publishing is best effort; a lost event leaves remote entries to expire
/// by TTL.
#[async_trait]
pub trait CacheBroadcast: Send + Sync {
    async fn post_written(&self, post: &PostRecord);
}

/// The object cache plus, when several processes serve one store, the
/// broadcast that keeps their caches coherent.
#[derive(Clone)]
pub struct CacheLayer {
    pub store: Arc<ObjectCache>,
    pub broadcast: Option<Arc<dyn CacheBroadcast>>,
}

impl CacheLayer {
    /// A cache no other process needs to hear about.
    pub fn local(store: Arc<ObjectCache>) -> Self {
        Self {
            store,
            broadcast: None,
        }
    }

    pub fn with_broadcast(mut self, broadcast: Arc<dyn CacheBroadcast>) -> Self {
        self.broadcast = Some(broadcast);
        self
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::application::pagination::{CursorPage, PageRequest};
    use crate::cache::{CacheConfig, ListingKey};

    fn post(text: &str) -> PostRecord {
        PostRecord {
            id: "p1".to_string(),
            author_id: "a1".to_string(),
            text: text.to_string(),
            created_at: datetime!(2024-05-01 10:00 UTC),
            last_modified_at: datetime!(2024-05-01 11:00 UTC),
            origin_key: 1,
        }
    }

    #[test]
    fn remote_write_drops_post_and_timeline() {
        let cache = ObjectCache::new(&CacheConfig::default());
        let key = ListingKey::new(ListingScope::Timeline, "a1", &PageRequest::first(10));
        cache.set_post(post("hello"));
        let generation = cache.listing_generation(ListingScope::Timeline, "a1");
        assert!(cache.fill_post_list(&key, CursorPage::empty(), generation));

        let event = CacheEvent::post_written("replica-b", &post("world"));
        assert!(event.apply("replica-a", &cache));

        assert!(cache.get_post("p1").is_none());
        assert!(cache.get_post_list(&key).is_none());
    }

    #[test]
    fn own_events_are_ignored() {
        let cache = ObjectCache::new(&CacheConfig::default());
        cache.set_post(post("hello"));

        let event = CacheEvent::post_written("replica-a", &post("hello"));
        assert!(!event.apply("replica-a", &cache));
        assert!(cache.get_post("p1").is_some());
    }

    #[test]
    fn events_survive_the_wire() {
        let event = CacheEvent::post_written("replica-a", &post("hello"));
        let payload = serde_json::to_string(&event).expect("encode");
        assert!(payload.contains("\"post_id\":\"p1\""));
        let decoded: CacheEvent = serde_json::from_str(&payload).expect("decode");
        assert_eq!(decoded, event);
    }
}
