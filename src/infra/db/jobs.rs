use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::jobs::FanOutJob;
use crate::application::repos::{FanOutQueue, RepoError};
use crate::domain::types::{JobState, JobType};

use super::{PostgresRepositories, map_sqlx_error};

const DEFAULT_PRIORITY: i32 = 10;

#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
}

impl PostgresRepositories {
    /// Push a job onto an apalis queue, returning the assigned id.
    pub async fn push_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
        sqlx::query_scalar("SELECT (apalis.push_job($1, $2::json, $3, $4, $5, $6)).id")
            .bind(job.job_type.as_str())
            .bind(job.payload)
            .bind(JobState::Pending.as_str())
            .bind(job.run_at)
            .bind(job.max_attempts)
            .bind(job.priority)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}

/// Durable fan-out queue on the apalis `fan_out` namespace.
#[derive(Clone)]
pub struct PostgresFanOutQueue {
    repositories: PostgresRepositories,
    max_attempts: i32,
}

impl PostgresFanOutQueue {
    pub fn new(repositories: PostgresRepositories, max_attempts: u32) -> Self {
        Self {
            repositories,
            max_attempts: i32::try_from(max_attempts).unwrap_or(i32::MAX),
        }
    }
}

#[async_trait]
impl FanOutQueue for PostgresFanOutQueue {
    async fn enqueue(&self, job: FanOutJob) -> Result<String, RepoError> {
        let payload = serde_json::to_value(&job).map_err(RepoError::from_persistence)?;
        self.repositories
            .push_job(NewJobRecord {
                job_type: JobType::FanOut,
                payload,
                run_at: OffsetDateTime::now_utc(),
                max_attempts: self.max_attempts,
                priority: DEFAULT_PRIORITY,
            })
            .await
    }
}
