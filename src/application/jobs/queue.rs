use tracing::{error, info};

use crate::application::repos::FanOutQueue;

use super::payload::FanOutJob;

/// Hand a lifecycle event to the fan-out workers.
///
/// The originating write is already committed when this runs; an enqueue
/// failure is logged, not returned, and the affected feeds miss the event.
pub async fn emit_lifecycle_event(queue: &dyn FanOutQueue, job: FanOutJob) {
    let kind = job.kind();
    let scope = job.author_scope().to_string();

    match queue.enqueue(job).await {
        Ok(job_id) => info!(
            target = "application::jobs::queue",
            job_id = %job_id,
            kind,
            author_scope = %scope,
            "lifecycle event enqueued"
        ),
        Err(err) => error!(
            target = "application::jobs::queue",
            kind,
            author_scope = %scope,
            error = %err,
            "failed to enqueue lifecycle event"
        ),
    }
}
