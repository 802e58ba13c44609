use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::application::pagination::CursorPage;
use crate::domain::entities::{FeedEntryRecord, PostRecord};

#[derive(Debug, Deserialize)]
pub struct PostTextRequest {
    #[serde(default)]
    pub text: String,
}

/// `page` and `size` arrive as raw strings so that a malformed size is
/// reported as an invalid size rather than a generic query rejection.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub text: String,
    pub author_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified_at: OffsetDateTime,
}

impl From<PostRecord> for PostView {
    fn from(post: PostRecord) -> Self {
        Self {
            id: post.id,
            text: post.text,
            author_id: post.author_id,
            created_at: post.created_at,
            last_modified_at: post.last_modified_at,
        }
    }
}

impl From<FeedEntryRecord> for PostView {
    fn from(entry: FeedEntryRecord) -> Self {
        Self {
            id: entry.origin_id,
            text: entry.text,
            author_id: entry.author_id,
            created_at: entry.created_at,
            last_modified_at: entry.last_modified_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPageResponse {
    pub posts: Vec<PostView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page: Option<String>,
}

impl<T: Into<PostView>> From<CursorPage<T>> for PostPageResponse {
    fn from(page: CursorPage<T>) -> Self {
        Self {
            posts: page.items.into_iter().map(Into::into).collect(),
            next_page: page.next_cursor,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<String>,
}
