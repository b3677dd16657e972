use nodeup_core::api::TaskError;
use nodeup_core::executor::traits::RetryStrategyPlugin;
use nodeup_core::executor::types::RetryConfig;
use std::time::Duration;

pub struct FixedRetryPlugin {
    config: RetryConfig,
}

pub struct ExponentialBackoffPlugin {
    config: RetryConfig,
}

pub struct LinearRetryPlugin {
    config: RetryConfig,
}

impl FixedRetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl ExponentialBackoffPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl LinearRetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RetryStrategyPlugin for FixedRetryPlugin {
    fn name(&self) -> &str {
        "fixed"
    }

    fn next_delay(&self, _attempt: u32, _error: &TaskError) -> Duration {
        Duration::from_millis(self.config.base_delay_ms)
    }
}

impl RetryStrategyPlugin for ExponentialBackoffPlugin {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, attempt: u32, _error: &TaskError) -> Duration {
        let exp = 1u64 << attempt.saturating_sub(1).min(30);
        let delay = self.config.base_delay_ms.saturating_mul(exp);
        let delay = delay.min(self.config.max_delay_ms);
        Duration::from_millis(delay)
    }
}

impl RetryStrategyPlugin for LinearRetryPlugin {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, attempt: u32, _error: &TaskError) -> Duration {
        let multiplier = attempt.max(1) as u64;
        let delay = self.config.base_delay_ms.saturating_mul(multiplier);
        let delay = delay.min(self.config.max_delay_ms);
        Duration::from_millis(delay)
    }
}
