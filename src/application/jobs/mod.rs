mod context;
mod fan_out;
mod local;
mod locks;
mod payload;
mod queue;

pub use context::{FanOutContext, job_failed};
pub use fan_out::process_fan_out_job;
pub use local::{LocalFanOutQueue, LocalQueueOptions};
pub use locks::{AuthorGuard, AuthorLock, AuthorLocks};
pub use payload::{FanOutJob, PostEvent, SubscriptionEvent};
pub use queue::emit_lifecycle_event;
