use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Give up on a task after this long. Once bootstrap has started there is no
/// safe rollback, so the agent keeps trying for a year.
pub const MAX_TASK_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Executor configuration (`[executor]` in the app config).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Ceiling measured from the start of the run.
    #[serde(default = "default_max_task_duration_secs")]
    pub max_task_duration_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_retry_strategy(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_task_duration_secs: default_max_task_duration_secs(),
        }
    }
}

fn default_retry_strategy() -> String {
    "fixed".to_string()
}

fn default_base_delay_ms() -> u64 {
    10_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_max_task_duration_secs() -> u64 {
    MAX_TASK_DURATION.as_secs()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// 0 means "number of CPUs".
    #[serde(default)]
    pub max_concurrency: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_concurrency: 0 }
    }
}

/// Knobs for one scheduler run.
#[derive(Debug, Clone)]
pub struct RunTasksOptions {
    pub max_task_duration: Duration,
    pub max_concurrency: usize,
}

impl Default for RunTasksOptions {
    fn default() -> Self {
        Self {
            max_task_duration: MAX_TASK_DURATION,
            max_concurrency: num_cpus::get().max(1),
        }
    }
}

impl RunTasksOptions {
    pub fn from_config(cfg: &ExecutionConfig) -> Self {
        let max_concurrency = match cfg.concurrency.max_concurrency {
            0 => num_cpus::get(),
            n => n,
        };
        Self {
            max_task_duration: Duration::from_secs(cfg.retry.max_task_duration_secs),
            max_concurrency: max_concurrency.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ceiling_is_one_year() {
        let opts = RunTasksOptions::from_config(&ExecutionConfig::default());
        assert_eq!(opts.max_task_duration, Duration::from_secs(31_536_000));
        assert!(opts.max_concurrency >= 1);
    }

    #[test]
    fn explicit_concurrency_is_kept() {
        let mut cfg = ExecutionConfig::default();
        cfg.concurrency.max_concurrency = 3;
        assert_eq!(RunTasksOptions::from_config(&cfg).max_concurrency, 3);
    }
}
