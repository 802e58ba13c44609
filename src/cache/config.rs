//! Cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_SECONDS: u64 = 3600;
const DEFAULT_POST_LIMIT: usize = 1000;
const DEFAULT_LISTING_LIMIT: usize = 500;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Wrap stores with the read-through cache.
    pub enabled: bool,
    /// Lifetime of every cache entry.
    pub ttl_seconds: u64,
    /// Maximum single-post entries.
    pub post_limit: usize,
    /// Maximum listing pages, per listing kind.
    pub listing_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            post_limit: DEFAULT_POST_LIMIT,
            listing_limit: DEFAULT_LISTING_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl_seconds: settings.ttl_seconds,
            post_limit: settings.post_limit,
            listing_limit: settings.listing_limit,
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Returns the post limit as NonZeroUsize, clamping to 1 if zero.
    pub fn post_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.post_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the listing limit as NonZeroUsize, clamping to 1 if zero.
    pub fn listing_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.listing_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Write-generation slots: one per cacheable post and listing owner.
    pub fn generation_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.post_limit.saturating_add(self.listing_limit))
            .unwrap_or(NonZeroUsize::MIN)
    }
}
