//! feedline: a social-feed backend with a fan-out materialized feed.
//!
//! Posts are written to an authoritative store, lifecycle events are fanned
//! out to per-subscriber feed copies by background workers, and reads go
//! through a TTL-bounded object cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
