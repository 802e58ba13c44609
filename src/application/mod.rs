//! Application services: posts, subscriptions, feeds, and fan-out jobs.

pub mod error;
pub mod feed;
pub mod jobs;
pub mod pagination;
pub mod posts;
pub mod repos;
pub mod subscriptions;
