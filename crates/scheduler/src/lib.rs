pub mod error;
pub mod metrics;
pub mod model;
pub mod reaction;
pub mod retry;

pub use error::SchedulerError;
pub use metrics::SchedulerStats;
pub use model::{EvaluationKind, SchedulerConfig, Trigger};
pub use reaction::{Admission, Pipeline, ReactionScheduler};
pub use retry::{retry_until, RetryPolicy};
