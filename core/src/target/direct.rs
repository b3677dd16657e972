use async_trait::async_trait;

use super::{TargetBackend, TargetKind};
use crate::error::{ExecutorError, TaskError};
use crate::executor::types::{CheckOutcome, ExecutionResult, NodeTask, TaskContext, TaskOutcome};
use crate::executor::{TaskGraph, TaskKey};

/// Converges the live host now.
#[derive(Debug, Default)]
pub struct DirectTarget;

impl DirectTarget {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TargetBackend for DirectTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Direct
    }

    async fn execute(
        &self,
        key: &TaskKey,
        task: &dyn NodeTask,
        ctx: &TaskContext,
        check_existing: bool,
    ) -> Result<TaskOutcome, TaskError> {
        let changes = if check_existing {
            match task.check(ctx).await? {
                CheckOutcome::Satisfied => {
                    tracing::debug!(task = %key, "already in desired state");
                    return Ok(TaskOutcome::Skipped);
                }
                CheckOutcome::Changes(changes) => changes,
            }
        } else {
            task.desired()
        };

        tracing::info!(task = %key, kind = task.kind(), changes = changes.len(), "applying");
        task.apply(ctx).await?;
        Ok(TaskOutcome::Applied(changes))
    }

    async fn finish(
        &self,
        graph: &TaskGraph,
        result: &ExecutionResult,
    ) -> Result<(), ExecutorError> {
        tracing::info!(
            tasks = graph.len(),
            applied = result.applied(),
            unchanged = result.skipped(),
            retries = result.retries(),
            "node converged"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{task_context, MemoryHost, StubTask};
    use std::sync::Arc;

    #[tokio::test]
    async fn satisfied_check_skips_apply() {
        let host = Arc::new(MemoryHost::default());
        let ctx = task_context(host.clone());
        let task = StubTask::satisfied();

        let outcome = DirectTarget
            .execute(&TaskKey::new("t"), &task, &ctx, true)
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Skipped);
        assert_eq!(task.applies(), 0);
    }

    #[tokio::test]
    async fn without_check_every_task_applies() {
        let host = Arc::new(MemoryHost::default());
        let ctx = task_context(host);
        let task = StubTask::satisfied();

        let outcome = DirectTarget
            .execute(&TaskKey::new("t"), &task, &ctx, false)
            .await
            .unwrap();
        assert!(outcome.is_mutation());
        assert_eq!(task.applies(), 1);
    }
}
