//! Shared cursor pagination helpers.
//!
//! Timeline and feed listings share one stateless token format,
//! `"<size>-<lastKey>"`, where `lastKey` is the store-local ordering key of
//! the last item on the page that produced the token.

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

const TOKEN_SEPARATOR: char = '-';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("invalid page token: {0}")]
    InvalidToken(String),
    #[error("invalid page size {0}; expected 1..=100")]
    InvalidSize(i64),
}

/// Decoded pagination token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken {
    size: u32,
    last_key: String,
}

impl PageToken {
    pub fn new(size: u32, last_key: impl Into<String>) -> Self {
        Self {
            size,
            last_key: last_key.into(),
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn last_key(&self) -> &str {
        &self.last_key
    }

    pub fn encode(&self) -> String {
        format!("{}{TOKEN_SEPARATOR}{}", self.size, self.last_key)
    }

    /// Split on the first separator; the key may itself contain separators.
    pub fn decode(token: &str) -> Result<Self, PaginationError> {
        let (size, last_key) = token
            .split_once(TOKEN_SEPARATOR)
            .ok_or_else(|| PaginationError::InvalidToken("missing separator".into()))?;

        if size.is_empty() || !size.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PaginationError::InvalidToken(format!(
                "size `{size}` is not a positive integer"
            )));
        }
        let size: u32 = size
            .parse()
            .map_err(|_| PaginationError::InvalidToken(format!("size `{size}` is out of range")))?;
        if size == 0 {
            return Err(PaginationError::InvalidToken(
                "size must be positive".into(),
            ));
        }
        if last_key.is_empty() {
            return Err(PaginationError::InvalidToken("missing last key".into()));
        }

        Ok(Self::new(size, last_key))
    }

    /// Parse `last_key` as a numeric store key.
    ///
    /// A key that is not a number can never resolve to a position, which is
    /// the same outcome as a key that does not exist.
    pub fn numeric_key(&self) -> Result<i64, PaginationError> {
        self.last_key.parse().map_err(|_| {
            PaginationError::InvalidToken(format!("unknown position `{}`", self.last_key))
        })
    }
}

/// A resolved page request: validated size plus optional starting position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub size: u32,
    pub cursor: Option<PageToken>,
}

impl PageRequest {
    pub fn new(size: u32, cursor: Option<PageToken>) -> Self {
        Self { size, cursor }
    }

    pub fn first(size: u32) -> Self {
        Self::new(size, None)
    }

    /// Combine an optional raw token with an optional explicit size.
    ///
    /// An explicit size wins over the size embedded in the token; with
    /// neither, the default size applies. The result must lie in
    /// `1..=MAX_PAGE_SIZE`.
    pub fn resolve(token: Option<&str>, size: Option<i64>) -> Result<Self, PaginationError> {
        let cursor = token
            .filter(|raw| !raw.is_empty())
            .map(PageToken::decode)
            .transpose()?;

        let size = match (size, cursor.as_ref()) {
            (Some(explicit), _) => explicit,
            (None, Some(cursor)) => i64::from(cursor.size()),
            (None, None) => i64::from(DEFAULT_PAGE_SIZE),
        };

        if !(1..=i64::from(MAX_PAGE_SIZE)).contains(&size) {
            return Err(PaginationError::InvalidSize(size));
        }

        Ok(Self::new(size as u32, cursor))
    }

    /// Canonical token string of the starting position; empty for the first page.
    pub fn token_key(&self) -> String {
        self.cursor
            .as_ref()
            .map(PageToken::encode)
            .unwrap_or_default()
    }

    /// Number of rows to fetch so the page can tell whether more items follow.
    pub fn fetch_limit(&self) -> usize {
        self.size as usize + 1
    }

    pub fn next_token(&self, last_key: impl Into<String>) -> String {
        PageToken::new(self.size, last_key).encode()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> CursorPage<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    /// Build a page from up to `request.fetch_limit()` rows in descending order.
    ///
    /// The extra row is the peek-ahead probe: when present it is dropped and
    /// the page carries a token positioned at the last kept item.
    pub fn from_peeked(
        mut rows: Vec<T>,
        request: &PageRequest,
        key_of: impl Fn(&T) -> String,
    ) -> Self {
        let limit = request.size as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let next_cursor = if has_more {
            rows.last().map(|last| request.next_token(key_of(last)))
        } else {
            None
        };

        Self::new(rows, next_cursor)
    }
}
