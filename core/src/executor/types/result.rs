use std::collections::HashMap;

use serde::Serialize;

use super::task::Change;
use crate::executor::TaskKey;

/// What a backend did with one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The host was mutated.
    Applied(Vec<Change>),
    /// Existing state already matched; nothing was done.
    Skipped,
    /// Dry run: these changes would be made.
    Planned(Vec<Change>),
    /// Script emit: these steps were compiled.
    Rendered(Vec<String>),
}

impl TaskOutcome {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Result of running a single task to completion
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub key: TaskKey,

    pub outcome: TaskOutcome,

    /// Attempts made, including the successful one
    pub attempts: u32,

    pub duration_ms: u64,
}

/// Result of running a whole task graph
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    pub run_id: String,

    pub total_tasks: usize,

    pub duration_ms: u64,

    pub task_results: HashMap<TaskKey, TaskResult>,

    /// Keys in completion order
    pub completion_order: Vec<TaskKey>,
}

impl ExecutionResult {
    pub fn applied(&self) -> usize {
        self.task_results
            .values()
            .filter(|r| r.outcome.is_mutation())
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.task_results
            .values()
            .filter(|r| r.outcome == TaskOutcome::Skipped)
            .count()
    }

    pub fn retries(&self) -> u32 {
        self.task_results
            .values()
            .map(|r| r.attempts.saturating_sub(1))
            .sum()
    }
}
