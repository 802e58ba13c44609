//! In-memory repositories for single-process deployments and tests.
//!
//! Each store sits behind its own lock; no lock is held across an await.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::application::pagination::{CursorPage, PageRequest, PaginationError};
use crate::application::repos::{
    CreatePostParams, FeedContentUpdate, FeedRepo, FeedWriteRepo, PostsRepo, PostsWriteRepo,
    RepoError, SubscriptionsRepo, UpdatePostParams,
};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::entities::{FeedEntryRecord, PostRecord};

const SOURCE: &str = "infra::memory";

#[derive(Default)]
struct PostTable {
    by_id: HashMap<String, PostRecord>,
    /// author -> origin_key -> post id
    timelines: HashMap<String, BTreeMap<i64, String>>,
    last_origin_key: i64,
}

#[derive(Default)]
struct SubscriptionTable {
    /// subscribee -> subscribers, in insertion order
    subscribers: HashMap<String, Vec<String>>,
    /// subscriber -> subscribees, in insertion order
    subscriptions: HashMap<String, Vec<String>>,
}

#[derive(Default)]
struct FeedTable {
    /// subscriber -> surrogate_key -> entry
    feeds: HashMap<String, BTreeMap<i64, FeedEntryRecord>>,
    /// origin post id -> subscriber -> surrogate key of their copy
    copies: HashMap<String, HashMap<String, i64>>,
}

#[derive(Default)]
pub struct InMemoryRepositories {
    posts: RwLock<PostTable>,
    subscriptions: RwLock<SubscriptionTable>,
    feed: RwLock<FeedTable>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest-first page of `entries` strictly below the cursor position.
fn page_below<T: Clone>(
    entries: Option<&BTreeMap<i64, T>>,
    page: &PageRequest,
    scope: &str,
) -> Result<CursorPage<(i64, T)>, RepoError> {
    let start = match page.cursor.as_ref() {
        Some(cursor) => {
            let key = cursor.numeric_key()?;
            if !entries.is_some_and(|entries| entries.contains_key(&key)) {
                return Err(PaginationError::InvalidToken(format!(
                    "position {key} is not in `{scope}`"
                ))
                .into());
            }
            Some(key)
        }
        None => None,
    };

    let Some(entries) = entries else {
        return Ok(CursorPage::empty());
    };

    let rows = match start {
        Some(key) => entries
            .range(..key)
            .rev()
            .take(page.fetch_limit())
            .map(|(key, value)| (*key, value.clone()))
            .collect(),
        None => entries
            .iter()
            .rev()
            .take(page.fetch_limit())
            .map(|(key, value)| (*key, value.clone()))
            .collect(),
    };

    Ok(CursorPage::from_peeked(rows, page, |(key, _)| key.to_string()))
}

#[async_trait]
impl PostsRepo for InMemoryRepositories {
    async fn find_post_by_id(&self, id: &str) -> Result<Option<PostRecord>, RepoError> {
        Ok(rw_read(&self.posts, SOURCE, "find_post_by_id")
            .by_id
            .get(id)
            .cloned())
    }

    async fn list_posts_by_author(
        &self,
        author_id: &str,
        page: PageRequest,
    ) -> Result<CursorPage<PostRecord>, RepoError> {
        let table = rw_read(&self.posts, SOURCE, "list_posts_by_author");
        let ids = page_below(table.timelines.get(author_id), &page, author_id)?;

        let items = ids
            .items
            .iter()
            .filter_map(|(_, id)| table.by_id.get(id).cloned())
            .collect();
        Ok(CursorPage::new(items, ids.next_cursor))
    }

    async fn list_all_posts_by_author(
        &self,
        author_id: &str,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let table = rw_read(&self.posts, SOURCE, "list_all_posts_by_author");
        Ok(table
            .timelines
            .get(author_id)
            .map(|timeline| {
                timeline
                    .values()
                    .filter_map(|id| table.by_id.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl PostsWriteRepo for InMemoryRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut table = rw_write(&self.posts, SOURCE, "create_post");
        if table.by_id.contains_key(&params.id) {
            return Err(RepoError::Duplicate {
                constraint: "posts_id_key".to_string(),
            });
        }

        table.last_origin_key += 1;
        let post = PostRecord {
            id: params.id,
            author_id: params.author_id,
            text: params.text,
            created_at: params.created_at,
            last_modified_at: params.created_at,
            origin_key: table.last_origin_key,
        };

        table
            .timelines
            .entry(post.author_id.clone())
            .or_default()
            .insert(post.origin_key, post.id.clone());
        table.by_id.insert(post.id.clone(), post.clone());
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut table = rw_write(&self.posts, SOURCE, "update_post");
        let post = table.by_id.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        if post.author_id != params.author_id {
            return Err(RepoError::Forbidden);
        }

        post.text = params.text;
        post.last_modified_at = params.last_modified_at;
        Ok(post.clone())
    }
}

#[async_trait]
impl SubscriptionsRepo for InMemoryRepositories {
    async fn add_subscription(
        &self,
        subscribee_id: &str,
        subscriber_id: &str,
    ) -> Result<bool, RepoError> {
        let mut table = rw_write(&self.subscriptions, SOURCE, "add_subscription");
        let subscribers = table
            .subscribers
            .entry(subscribee_id.to_string())
            .or_default();
        if subscribers.iter().any(|id| id == subscriber_id) {
            return Ok(false);
        }
        subscribers.push(subscriber_id.to_string());

        table
            .subscriptions
            .entry(subscriber_id.to_string())
            .or_default()
            .push(subscribee_id.to_string());
        Ok(true)
    }

    async fn list_subscribers(&self, user_id: &str) -> Result<Vec<String>, RepoError> {
        Ok(rw_read(&self.subscriptions, SOURCE, "list_subscribers")
            .subscribers
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<String>, RepoError> {
        Ok(rw_read(&self.subscriptions, SOURCE, "list_subscriptions")
            .subscriptions
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl FeedRepo for InMemoryRepositories {
    async fn list_feed(
        &self,
        subscriber_id: &str,
        page: PageRequest,
    ) -> Result<CursorPage<FeedEntryRecord>, RepoError> {
        let table = rw_read(&self.feed, SOURCE, "list_feed");
        let rows = page_below(table.feeds.get(subscriber_id), &page, subscriber_id)?;
        Ok(CursorPage::new(
            rows.items.into_iter().map(|(_, entry)| entry).collect(),
            rows.next_cursor,
        ))
    }
}

#[async_trait]
impl FeedWriteRepo for InMemoryRepositories {
    async fn upsert_feed_entry(&self, entry: &FeedEntryRecord) -> Result<bool, RepoError> {
        let mut table = rw_write(&self.feed, SOURCE, "upsert_feed_entry");
        let feed = table.feeds.entry(entry.subscriber_id.clone()).or_default();

        if let Some(existing) = feed.get_mut(&entry.surrogate_key) {
            if !entry.supersedes(existing) {
                return Ok(false);
            }
            existing.text = entry.text.clone();
            existing.last_modified_at = entry.last_modified_at;
            return Ok(true);
        }

        feed.insert(entry.surrogate_key, entry.clone());
        table
            .copies
            .entry(entry.origin_id.clone())
            .or_default()
            .insert(entry.subscriber_id.clone(), entry.surrogate_key);
        Ok(true)
    }

    async fn update_feed_entries(&self, update: &FeedContentUpdate) -> Result<u64, RepoError> {
        let mut guard = rw_write(&self.feed, SOURCE, "update_feed_entries");
        let table = &mut *guard;
        let Some(subscribers) = table.copies.get(&update.origin_id) else {
            return Ok(0);
        };

        let mut written = 0;
        for (subscriber_id, surrogate_key) in subscribers {
            let Some(entry) = table
                .feeds
                .get_mut(subscriber_id)
                .and_then(|feed| feed.get_mut(surrogate_key))
            else {
                continue;
            };
            if entry.last_modified_at <= update.last_modified_at {
                entry.text = update.text.clone();
                entry.last_modified_at = update.last_modified_at;
                written += 1;
            }
        }
        Ok(written)
    }
}
