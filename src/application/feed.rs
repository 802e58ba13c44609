use std::sync::Arc;

use crate::application::error::ServiceError;
use crate::application::pagination::{CursorPage, PageRequest};
use crate::application::repos::FeedRepo;
use crate::domain::entities::FeedEntryRecord;

/// Read side of the materialized feed.
///
/// The feed is eventually consistent: entries appear once the fan-out
/// workers have processed the corresponding lifecycle events.
#[derive(Clone)]
pub struct FeedService {
    feed: Arc<dyn FeedRepo>,
}

impl FeedService {
    pub fn new(feed: Arc<dyn FeedRepo>) -> Self {
        Self { feed }
    }

    pub async fn list_feed(
        &self,
        subscriber_id: &str,
        token: Option<&str>,
        size: Option<i64>,
    ) -> Result<CursorPage<FeedEntryRecord>, ServiceError> {
        let page = PageRequest::resolve(token, size)?;
        Ok(self.feed.list_feed(subscriber_id, page).await?)
    }
}
