//! Read-through object cache for posts, timelines, and feeds.
//!
//! Entries are bounded by LRU capacity and a TTL. Post writes invalidate the
//! author's timeline listings and refresh the single-post entry; feed
//! listings expire by TTL only. When several processes share one store, a
//! [`CacheBroadcast`] carries each write to the others.
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 3600
//! post_limit = 1000
//! listing_limit = 500
//! ```

mod broadcast;
mod config;
mod keys;
pub(crate) mod lock;
mod repos;
mod store;

pub use broadcast::{CacheBroadcast, CacheEvent, CacheLayer};
pub use config::CacheConfig;
pub use keys::{ListingKey, ListingScope, post_key};
pub use repos::{CachedFeedRepo, CachedPostsRepo};
pub use store::ObjectCache;
