use thiserror::Error;

use super::task::TaskError;
use crate::executor::TaskKey;

/// Errors raised while merging builder fragments into one task graph.
///
/// Every variant is fatal and is raised before any task runs.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("duplicate task key {key}: contributed by {first} and {second}")]
    DuplicateKey {
        key: TaskKey,
        first: String,
        second: String,
    },

    #[error("dependency not found: task {task} references {missing}")]
    DependencyNotFound { task: TaskKey, missing: TaskKey },

    #[error("circular dependency detected: {0}")]
    Cycle(String),

    #[error("builder {builder} failed: {source}")]
    Builder {
        builder: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Errors raised while running an assembled graph.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("task {key} failed: {source}")]
    TaskFailed {
        key: TaskKey,
        #[source]
        source: TaskError,
    },

    #[error("task {key} did not complete after {attempts} attempts before the deadline; last error: {last_error}")]
    DeadlineExceeded {
        key: TaskKey,
        attempts: u32,
        last_error: String,
    },

    #[error("{pending} tasks could not be scheduled")]
    Stalled { pending: usize },

    #[error("error finishing target {target}: {message}")]
    Finish {
        target: &'static str,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal executor error: {0}")]
    Internal(String),
}
