use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::ExecutorError;
use crate::target::TargetBackend;

use super::graph::TaskGraph;
use super::traits::RetryStrategyPlugin;
use super::types::{ExecutionResult, NodeTask, RunTasksOptions, TaskContext, TaskResult};
use super::TaskKey;

/// Stand-in deadline when the configured ceiling does not fit in an `Instant`.
const UNBOUNDED: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Ready,
    Running,
    Done,
    Failed,
}

#[derive(Debug)]
struct TaskSlot {
    state: TaskState,
    attempts: u32,
}

/// Execution state of every task in one run.
///
/// The key set is fixed when the run starts and each task has its own lock,
/// so a readiness check on one task never waits on another task's update.
#[derive(Debug)]
pub struct TaskStates {
    slots: HashMap<TaskKey, Mutex<TaskSlot>>,
}

impl TaskStates {
    pub fn new(graph: &TaskGraph) -> Self {
        let slots = graph
            .keys()
            .iter()
            .map(|k| {
                (
                    k.clone(),
                    Mutex::new(TaskSlot {
                        state: TaskState::Pending,
                        attempts: 0,
                    }),
                )
            })
            .collect();
        Self { slots }
    }

    fn with_slot<R>(&self, key: &TaskKey, f: impl FnOnce(&mut TaskSlot) -> R) -> Option<R> {
        let slot = self.slots.get(key)?;
        let mut guard = match slot.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        Some(f(&mut guard))
    }

    pub fn state(&self, key: &TaskKey) -> Option<TaskState> {
        self.with_slot(key, |s| s.state)
    }

    pub fn attempts(&self, key: &TaskKey) -> u32 {
        self.with_slot(key, |s| s.attempts).unwrap_or(0)
    }

    fn set(&self, key: &TaskKey, state: TaskState) {
        self.with_slot(key, |s| s.state = state);
    }

    fn begin_attempt(&self, key: &TaskKey) -> u32 {
        self.with_slot(key, |s| {
            s.state = TaskState::Running;
            s.attempts += 1;
            s.attempts
        })
        .unwrap_or(0)
    }

    /// Move a pending task to ready if everything it references is done.
    /// Returns true only for the caller that made the transition.
    fn try_ready(&self, graph: &TaskGraph, key: &TaskKey) -> bool {
        let deps_done = graph
            .dependencies(key)
            .iter()
            .all(|d| self.state(d) == Some(TaskState::Done));
        if !deps_done {
            return false;
        }
        self.with_slot(key, |s| {
            if s.state == TaskState::Pending {
                s.state = TaskState::Ready;
                true
            } else {
                false
            }
        })
        .unwrap_or(false)
    }

    pub fn count(&self, state: TaskState) -> usize {
        self.slots
            .keys()
            .filter(|k| self.state(k) == Some(state))
            .count()
    }
}

/// Runs a task graph in dependency order against a target backend.
///
/// A task becomes eligible once every task it references is done, and
/// eligibility is re-evaluated each time a task finishes. Transient failures
/// are retried until `max_task_duration` (measured from the start of the run)
/// has passed; a fatal failure stops the run immediately.
pub struct Scheduler {
    retry: Arc<dyn RetryStrategyPlugin>,
    options: RunTasksOptions,
}

impl Scheduler {
    pub fn new(retry: Arc<dyn RetryStrategyPlugin>, options: RunTasksOptions) -> Self {
        Self { retry, options }
    }

    pub fn options(&self) -> &RunTasksOptions {
        &self.options
    }

    pub async fn run(
        &self,
        graph: &TaskGraph,
        target: &dyn TargetBackend,
        ctx: &TaskContext,
        check_existing: bool,
    ) -> Result<ExecutionResult, ExecutorError> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", run_id = %run_id, target = %target.kind());
        self.run_graph(run_id, graph, target, ctx, check_existing)
            .instrument(span)
            .await
    }

    async fn run_graph(
        &self,
        run_id: String,
        graph: &TaskGraph,
        target: &dyn TargetBackend,
        ctx: &TaskContext,
        check_existing: bool,
    ) -> Result<ExecutionResult, ExecutorError> {
        let started = Instant::now();
        let deadline = match started.checked_add(self.options.max_task_duration) {
            Some(deadline) => deadline,
            None => {
                tracing::warn!(
                    max_task_duration = ?self.options.max_task_duration,
                    "task ceiling too large, retrying without a deadline"
                );
                started.checked_add(UNBOUNDED).unwrap_or(started)
            }
        };
        let states = TaskStates::new(graph);
        let permits = Semaphore::new(self.options.max_concurrency.max(1));

        tracing::info!(
            tasks = graph.len(),
            max_concurrency = self.options.max_concurrency,
            retry_strategy = self.retry.name(),
            check_existing,
            "running tasks"
        );

        let start = |key: &TaskKey| {
            graph.get(key).map(|task| {
                self.drive(
                    key.clone(),
                    task.clone(),
                    target,
                    ctx,
                    check_existing,
                    deadline,
                    &states,
                    &permits,
                )
            })
        };

        let mut running = FuturesUnordered::new();
        for key in graph.keys() {
            if states.try_ready(graph, key) {
                running.extend(start(key));
            }
        }

        let mut result = ExecutionResult {
            run_id,
            total_tasks: graph.len(),
            ..Default::default()
        };

        while let Some((key, outcome)) = running.next().await {
            // Returning drops every in-flight task.
            let task_result = outcome?;
            result.completion_order.push(key.clone());
            result.task_results.insert(key.clone(), task_result);

            for dependent in graph.dependents(&key) {
                if states.try_ready(graph, dependent) {
                    running.extend(start(dependent));
                }
            }
        }

        let pending = graph.len() - result.task_results.len();
        if pending > 0 {
            return Err(ExecutorError::Stalled { pending });
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            duration_ms = result.duration_ms,
            retries = result.retries(),
            "all tasks done"
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        key: TaskKey,
        task: Arc<dyn NodeTask>,
        target: &dyn TargetBackend,
        ctx: &TaskContext,
        check_existing: bool,
        deadline: Instant,
        states: &TaskStates,
        permits: &Semaphore,
    ) -> (TaskKey, Result<TaskResult, ExecutorError>) {
        let started = Instant::now();

        loop {
            let permit = match permits.acquire().await {
                Ok(p) => p,
                Err(_) => {
                    let err = ExecutorError::Internal("task permits closed unexpectedly".into());
                    return (key, Err(err));
                }
            };
            let attempts = states.begin_attempt(&key);
            tracing::debug!(task = %key, kind = task.kind(), attempt = attempts, "running task");

            let outcome = target
                .execute(&key, task.as_ref(), ctx, check_existing)
                .await;
            drop(permit);

            let err = match outcome {
                Ok(outcome) => {
                    states.set(&key, TaskState::Done);
                    let result = TaskResult {
                        key: key.clone(),
                        outcome,
                        attempts,
                        duration_ms: started.elapsed().as_millis() as u64,
                    };
                    return (key, Ok(result));
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                states.set(&key, TaskState::Failed);
                tracing::error!(task = %key, attempt = attempts, "task failed: {err}");
                return (key.clone(), Err(ExecutorError::TaskFailed { key, source: err }));
            }

            let now = Instant::now();
            if now >= deadline {
                states.set(&key, TaskState::Failed);
                tracing::error!(task = %key, attempts, "giving up on task: {err}");
                let err = ExecutorError::DeadlineExceeded {
                    key: key.clone(),
                    attempts,
                    last_error: err.to_string(),
                };
                return (key, Err(err));
            }

            let delay = self.retry.next_delay(attempts, &err).min(deadline - now);
            tracing::warn!(task = %key, attempt = attempts, ?delay, "task failed: {err}");
            states.set(&key, TaskState::Ready);
            tokio::time::sleep(delay).await;
        }
    }
}
