//! Cache key construction.
//!
//! Keys are plain strings so listing entries of one user can be removed by
//! prefix: `pid:{post}`, `uts:{user}:{token}:{size}` for timelines and
//! `fts:{user}:{token}:{size}` for feeds.

use crate::application::pagination::PageRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingScope {
    /// An author's own posts.
    Timeline,
    /// A subscriber's materialized feed.
    Feed,
}

impl ListingScope {
    fn prefix(self) -> &'static str {
        match self {
            ListingScope::Timeline => "uts",
            ListingScope::Feed => "fts",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ListingScope::Timeline => "timeline",
            ListingScope::Feed => "feed",
        }
    }

    /// Prefix shared by every listing key of `user_id`.
    ///
    /// The trailing separator keeps user `ab` from matching user `abc`.
    pub fn user_prefix(self, user_id: &str) -> String {
        format!("{}:{user_id}:", self.prefix())
    }
}

/// Listing key: `(scope, userId, cursorToken, size)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingKey {
    pub scope: ListingScope,
    pub user_id: String,
    pub token: String,
    pub size: u32,
}

impl ListingKey {
    pub fn new(scope: ListingScope, user_id: &str, page: &PageRequest) -> Self {
        Self {
            scope,
            user_id: user_id.to_string(),
            token: page.token_key(),
            size: page.size,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}{}:{}",
            self.scope.user_prefix(&self.user_id),
            self.token,
            self.size
        )
    }
}

pub fn post_key(post_id: &str) -> String {
    format!("pid:{post_id}")
}
