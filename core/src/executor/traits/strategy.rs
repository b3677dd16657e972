use std::time::Duration;

use crate::error::TaskError;

/// Retry strategy plugin: how long to wait before the next attempt of a task
/// that failed with a transient error. The overall deadline is enforced by
/// the scheduler, not by the strategy.
pub trait RetryStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// `attempt` is the number of attempts made so far (1 after the first failure).
    fn next_delay(&self, attempt: u32, error: &TaskError) -> Duration;
}
