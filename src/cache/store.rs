//! TTL-bounded LRU storage for cached posts and listing pages.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;

use crate::application::pagination::CursorPage;
use crate::domain::entities::{FeedEntryRecord, PostRecord};

use super::config::CacheConfig;
use super::keys::{ListingKey, ListingScope, post_key};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Expiring<T> {
    fn live(&self, now: Instant) -> Option<T> {
        (now < self.expires_at).then(|| self.value.clone())
    }
}

/// Write counters for post and listing keys.
///
/// A read-through fill captures the generation of its key before reading the
/// store and is dropped if any write bumped it meanwhile. Keys absent from
/// the table report `floor`, the highest generation ever evicted, so an
/// eviction can only cause a spurious rejection, never a stale fill.
struct Generations {
    current: LruCache<String, u64>,
    floor: u64,
    counter: u64,
}

impl Generations {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            current: LruCache::new(capacity),
            floor: 0,
            counter: 0,
        }
    }

    fn get(&self, key: &str) -> u64 {
        self.current.peek(key).copied().unwrap_or(self.floor)
    }

    fn bump(&mut self, key: String) {
        self.counter += 1;
        if let Some((evicted, generation)) = self.current.push(key.clone(), self.counter)
            && evicted != key
        {
            self.floor = self.floor.max(generation);
        }
    }
}

/// Object cache keyed by the string keys from [`super::keys`].
///
/// A lookup that finds an expired entry removes it and reports a miss.
/// Read-through fills go through [`ObjectCache::fill_post`] and
/// [`ObjectCache::fill_post_list`], which refuse values a concurrent write
/// has superseded.
pub struct ObjectCache {
    ttl: Duration,
    generations: RwLock<Generations>,
    posts: RwLock<LruCache<String, Expiring<PostRecord>>>,
    post_lists: RwLock<LruCache<String, Expiring<CursorPage<PostRecord>>>>,
    feed_lists: RwLock<LruCache<String, Expiring<CursorPage<FeedEntryRecord>>>>,
}

impl ObjectCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            generations: RwLock::new(Generations::new(config.generation_limit_non_zero())),
            posts: RwLock::new(LruCache::new(config.post_limit_non_zero())),
            post_lists: RwLock::new(LruCache::new(config.listing_limit_non_zero())),
            feed_lists: RwLock::new(LruCache::new(config.listing_limit_non_zero())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // ========================================================================
    // Single posts
    // ========================================================================

    pub fn get_post(&self, post_id: &str) -> Option<PostRecord> {
        let key = post_key(post_id);
        let hit = lookup(
            &mut rw_write(&self.posts, SOURCE, "get_post"),
            &key,
            Instant::now(),
        );
        record_lookup("post", hit.is_some());
        hit
    }

    pub fn post_generation(&self, post_id: &str) -> u64 {
        rw_read(&self.generations, SOURCE, "post_generation").get(&post_key(post_id))
    }

    /// Store a post read from the store at `generation`.
    ///
    /// Returns false when a write touched the post since `generation` was taken.
    pub fn fill_post(&self, post: PostRecord, generation: u64) -> bool {
        let key = post_key(&post.id);
        let generations = rw_read(&self.generations, SOURCE, "fill_post");
        if generations.get(&key) != generation {
            return false;
        }
        let entry = self.expiring(post);
        rw_write(&self.posts, SOURCE, "fill_post").put(key, entry);
        true
    }

    /// Store a post this process just wrote.
    ///
    /// In-flight fills of the post are invalidated. An entry with a later
    /// modification time is kept, so racing writes never regress the cache.
    pub fn set_post(&self, post: PostRecord) {
        let key = post_key(&post.id);
        let mut generations = rw_write(&self.generations, SOURCE, "set_post");
        generations.bump(key.clone());

        let mut posts = rw_write(&self.posts, SOURCE, "set_post");
        let newer_cached = posts
            .peek(&key)
            .and_then(|cached| cached.live(Instant::now()))
            .is_some_and(|cached| cached.last_modified_at > post.last_modified_at);
        if !newer_cached {
            let entry = self.expiring(post);
            posts.put(key, entry);
        }
    }

    pub fn invalidate_post(&self, post_id: &str) {
        let key = post_key(post_id);
        let mut generations = rw_write(&self.generations, SOURCE, "invalidate_post");
        generations.bump(key.clone());
        if rw_write(&self.posts, SOURCE, "invalidate_post")
            .pop(&key)
            .is_some()
        {
            counter!("feedline_cache_invalidate_total", "kind" => "post").increment(1);
        }
    }

    // ========================================================================
    // Listing pages
    // ========================================================================

    pub fn get_post_list(&self, key: &ListingKey) -> Option<CursorPage<PostRecord>> {
        let hit = lookup(
            &mut rw_write(&self.post_lists, SOURCE, "get_post_list"),
            &key.render(),
            Instant::now(),
        );
        record_lookup(ListingScope::Timeline.as_str(), hit.is_some());
        hit
    }

    pub fn listing_generation(&self, scope: ListingScope, user_id: &str) -> u64 {
        rw_read(&self.generations, SOURCE, "listing_generation").get(&scope.user_prefix(user_id))
    }

    /// Store a timeline page read from the store at `generation`.
    ///
    /// Returns false when the author's listings were invalidated meanwhile.
    pub fn fill_post_list(
        &self,
        key: &ListingKey,
        page: CursorPage<PostRecord>,
        generation: u64,
    ) -> bool {
        let generations = rw_read(&self.generations, SOURCE, "fill_post_list");
        if generations.get(&key.scope.user_prefix(&key.user_id)) != generation {
            return false;
        }
        let entry = self.expiring(page);
        rw_write(&self.post_lists, SOURCE, "fill_post_list").put(key.render(), entry);
        true
    }

    pub fn get_feed_list(&self, key: &ListingKey) -> Option<CursorPage<FeedEntryRecord>> {
        let hit = lookup(
            &mut rw_write(&self.feed_lists, SOURCE, "get_feed_list"),
            &key.render(),
            Instant::now(),
        );
        record_lookup(ListingScope::Feed.as_str(), hit.is_some());
        hit
    }

    pub fn set_feed_list(&self, key: &ListingKey, page: CursorPage<FeedEntryRecord>) {
        let entry = self.expiring(page);
        rw_write(&self.feed_lists, SOURCE, "set_feed_list").put(key.render(), entry);
    }

    /// Remove every listing page of `user_id` in `scope`. Returns how many were dropped.
    pub fn invalidate_listings(&self, scope: ListingScope, user_id: &str) -> usize {
        let prefix = scope.user_prefix(user_id);
        let mut generations = rw_write(&self.generations, SOURCE, "invalidate_listings");
        generations.bump(prefix.clone());
        let removed = match scope {
            ListingScope::Timeline => remove_prefixed(
                &mut rw_write(&self.post_lists, SOURCE, "invalidate_listings.timeline"),
                &prefix,
            ),
            ListingScope::Feed => remove_prefixed(
                &mut rw_write(&self.feed_lists, SOURCE, "invalidate_listings.feed"),
                &prefix,
            ),
        };
        if removed > 0 {
            counter!("feedline_cache_invalidate_total", "kind" => scope.as_str())
                .increment(removed as u64);
        }
        removed
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Total entries currently held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        rw_read(&self.posts, SOURCE, "len.posts").len()
            + rw_read(&self.post_lists, SOURCE, "len.post_lists").len()
            + rw_read(&self.feed_lists, SOURCE, "len.feed_lists").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry and reject all fills already in flight.
    pub fn clear(&self) {
        let mut generations = rw_write(&self.generations, SOURCE, "clear");
        let highest = generations.counter + 1;
        generations.counter = highest;
        generations.floor = highest;
        generations.current.clear();
        rw_write(&self.posts, SOURCE, "clear.posts").clear();
        rw_write(&self.post_lists, SOURCE, "clear.post_lists").clear();
        rw_write(&self.feed_lists, SOURCE, "clear.feed_lists").clear();
    }

    fn expiring<T>(&self, value: T) -> Expiring<T> {
        Expiring {
            value,
            expires_at: Instant::now() + self.ttl,
        }
    }
}

fn lookup<T: Clone>(
    cache: &mut LruCache<String, Expiring<T>>,
    key: &str,
    now: Instant,
) -> Option<T> {
    let live = cache.get(key)?.live(now);
    if live.is_none() {
        cache.pop(key);
    }
    live
}

fn remove_prefixed<T>(cache: &mut LruCache<String, T>, prefix: &str) -> usize {
    let keys: Vec<String> = cache
        .iter()
        .filter(|(key, _)| key.starts_with(prefix))
        .map(|(key, _)| key.clone())
        .collect();
    for key in &keys {
        cache.pop(key);
    }
    keys.len()
}

fn record_lookup(kind: &'static str, hit: bool) {
    if hit {
        counter!("feedline_cache_hit_total", "kind" => kind).increment(1);
    } else {
        counter!("feedline_cache_miss_total", "kind" => kind).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::application::pagination::{PageRequest, PageToken};

    fn post(id: &str, author: &str, text: &str) -> PostRecord {
        PostRecord {
            id: id.to_string(),
            author_id: author.to_string(),
            text: text.to_string(),
            created_at: datetime!(2024-05-01 10:00 UTC),
            last_modified_at: datetime!(2024-05-01 10:00 UTC),
            origin_key: 1,
        }
    }

    fn timeline_key(user: &str, page: &PageRequest) -> ListingKey {
        ListingKey::new(ListingScope::Timeline, user, page)
    }

    #[test]
    fn post_round_trip_and_overwrite() {
        let cache = ObjectCache::new(&CacheConfig::default());
        assert!(cache.get_post("p1").is_none());

        cache.set_post(post("p1", "a1", "hello"));
        assert_eq!(cache.get_post("p1").map(|p| p.text), Some("hello".into()));

        cache.set_post(post("p1", "a1", "world"));
        assert_eq!(cache.get_post("p1").map(|p| p.text), Some("world".into()));

        cache.invalidate_post("p1");
        assert!(cache.get_post("p1").is_none());
    }

    #[test]
    fn expired_entries_are_misses() {
        let config = CacheConfig {
            ttl_seconds: 0,
            ..Default::default()
        };
        let cache = ObjectCache::new(&config);
        cache.set_post(post("p1", "a1", "hello"));
        assert!(cache.get_post("p1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn lru_capacity_evicts_oldest() {
        let config = CacheConfig {
            post_limit: 1,
            ..Default::default()
        };
        let cache = ObjectCache::new(&config);
        cache.set_post(post("p1", "a1", "one"));
        cache.set_post(post("p2", "a1", "two"));
        assert!(cache.get_post("p1").is_none());
        assert!(cache.get_post("p2").is_some());
    }

    #[test]
    fn listing_invalidation_is_scoped_to_one_user() {
        let cache = ObjectCache::new(&CacheConfig::default());
        let first = PageRequest::first(10);
        let second = PageRequest::new(10, Some(PageToken::new(10, "5")));

        let ab = cache.listing_generation(ListingScope::Timeline, "ab");
        let abc = cache.listing_generation(ListingScope::Timeline, "abc");
        assert!(cache.fill_post_list(&timeline_key("ab", &first), CursorPage::empty(), ab));
        assert!(cache.fill_post_list(&timeline_key("ab", &second), CursorPage::empty(), ab));
        assert!(cache.fill_post_list(&timeline_key("abc", &first), CursorPage::empty(), abc));
        cache.set_feed_list(
            &ListingKey::new(ListingScope::Feed, "ab", &first),
            CursorPage::empty(),
        );

        assert_eq!(cache.invalidate_listings(ListingScope::Timeline, "ab"), 2);
        assert!(cache.get_post_list(&timeline_key("ab", &first)).is_none());
        assert!(cache.get_post_list(&timeline_key("abc", &first)).is_some());
        assert!(
            cache
                .get_feed_list(&ListingKey::new(ListingScope::Feed, "ab", &first))
                .is_some()
        );
    }

    #[test]
    fn clear_drops_everything() {
        let cache = ObjectCache::new(&CacheConfig::default());
        cache.set_post(post("p1", "a1", "hello"));
        let generation = cache.listing_generation(ListingScope::Timeline, "a1");
        let key = timeline_key("a1", &PageRequest::first(10));
        assert!(cache.fill_post_list(&key, CursorPage::empty(), generation));
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.fill_post_list(&key, CursorPage::empty(), generation));
    }

    fn edited(mut post: PostRecord, text: &str, minutes: i64) -> PostRecord {
        post.text = text.to_string();
        post.last_modified_at += time::Duration::minutes(minutes);
        post
    }

    #[test]
    fn fill_after_concurrent_write_is_rejected() {
        let cache = ObjectCache::new(&CacheConfig::default());
        let original = post("p1", "a1", "hello");

        // a reader captures the generation, then a write lands before its fill
        let generation = cache.post_generation("p1");
        cache.set_post(edited(original.clone(), "world", 1));
        assert!(!cache.fill_post(original, generation));
        assert_eq!(cache.get_post("p1").map(|p| p.text), Some("world".into()));
    }

    #[test]
    fn fill_after_invalidation_is_rejected_even_without_an_entry() {
        let cache = ObjectCache::new(&CacheConfig::default());
        let generation = cache.post_generation("p1");
        cache.invalidate_post("p1");
        assert!(!cache.fill_post(post("p1", "a1", "hello"), generation));
        assert!(cache.get_post("p1").is_none());

        let fresh = cache.post_generation("p1");
        assert!(cache.fill_post(post("p1", "a1", "hello"), fresh));
    }

    #[test]
    fn set_post_never_regresses_to_an_older_version() {
        let cache = ObjectCache::new(&CacheConfig::default());
        let original = post("p1", "a1", "hello");
        cache.set_post(edited(original.clone(), "newest", 2));
        cache.set_post(edited(original, "older", 1));
        assert_eq!(cache.get_post("p1").map(|p| p.text), Some("newest".into()));
    }

    #[test]
    fn listing_fill_after_invalidation_is_rejected() {
        let cache = ObjectCache::new(&CacheConfig::default());
        let key = timeline_key("a1", &PageRequest::first(10));

        let generation = cache.listing_generation(ListingScope::Timeline, "a1");
        cache.invalidate_listings(ListingScope::Timeline, "a1");
        assert!(!cache.fill_post_list(&key, CursorPage::empty(), generation));
        assert!(cache.get_post_list(&key).is_none());

        // other authors keep filling
        let other = cache.listing_generation(ListingScope::Timeline, "b2");
        assert!(cache.fill_post_list(
            &timeline_key("b2", &PageRequest::first(10)),
            CursorPage::empty(),
            other
        ));
    }

    #[test]
    fn evicted_generations_reject_rather_than_accept() {
        let config = CacheConfig {
            post_limit: 1,
            listing_limit: 0,
            ..Default::default()
        };
        let cache = ObjectCache::new(&config);
        let generation = cache.post_generation("p1");
        cache.invalidate_post("p1");
        // pushes p1's generation out of the single slot
        cache.invalidate_post("p2");
        assert!(!cache.fill_post(post("p1", "a1", "hello"), generation));
    }
}
