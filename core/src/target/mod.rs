//! Execution strategies for an assembled task graph.

mod cloudinit;
mod direct;
mod dryrun;

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use async_trait::async_trait;

use crate::error::{ConfigError, ExecutorError, TaskError};
use crate::executor::types::{ExecutionResult, NodeTask, TaskContext, TaskOutcome};
use crate::executor::{TaskGraph, TaskKey};

pub use cloudinit::CloudInitTarget;
pub use direct::DirectTarget;
pub use dryrun::DryRunTarget;

/// Where dry-run reports and compiled scripts are written.
pub type OutputSink = Box<dyn Write + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Direct,
    DryRun,
    CloudInit,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::DryRun => "dryrun",
            Self::CloudInit => "cloudinit",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "dryrun" => Ok(Self::DryRun),
            "cloudinit" => Ok(Self::CloudInit),
            other => Err(ConfigError::InvalidTarget(other.to_string())),
        }
    }
}

/// One way of executing a task graph.
///
/// The scheduler calls `execute` once per attempt of each task, in dependency
/// order; `finish` runs once afterwards with the whole graph.
#[async_trait]
pub trait TargetBackend: Send + Sync {
    fn kind(&self) -> TargetKind;

    /// Whether tasks should compare against existing host state first.
    fn checks_existing_state(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        key: &TaskKey,
        task: &dyn NodeTask,
        ctx: &TaskContext,
        check_existing: bool,
    ) -> Result<TaskOutcome, TaskError>;

    async fn finish(&self, graph: &TaskGraph, result: &ExecutionResult)
        -> Result<(), ExecutorError>;
}
