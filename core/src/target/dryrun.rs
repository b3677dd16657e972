use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{OutputSink, TargetBackend, TargetKind};
use crate::error::{ExecutorError, TaskError};
use crate::executor::types::{
    Change, CheckOutcome, ExecutionResult, NodeTask, TaskContext, TaskOutcome,
};
use crate::executor::{TaskGraph, TaskKey};
use crate::model::AssetResolver;

/// Reports what a direct run would change. Never calls `apply`.
pub struct DryRunTarget {
    resolver: Arc<dyn AssetResolver>,
    out: Mutex<OutputSink>,
    planned: Mutex<HashMap<TaskKey, (&'static str, Vec<Change>)>>,
}

impl DryRunTarget {
    pub fn new(resolver: Arc<dyn AssetResolver>, out: OutputSink) -> Self {
        Self {
            resolver,
            out: Mutex::new(out),
            planned: Mutex::new(HashMap::new()),
        }
    }

    fn render_report(&self, graph: &TaskGraph) -> String {
        let planned = self.planned.lock().unwrap_or_else(PoisonError::into_inner);

        let mut report = String::new();
        let mut unchanged = Vec::new();

        for key in graph.topological_order() {
            match planned.get(&key) {
                Some((kind, changes)) if !changes.is_empty() => {
                    let _ = writeln!(report, "{kind} {key}");
                    for change in changes {
                        let current = change.current.as_deref().unwrap_or("<none>");
                        let _ = writeln!(report, "  {}: {} -> {}", change.field, current, change.desired);
                    }
                    report.push('\n');
                }
                _ => unchanged.push(key.to_string()),
            }
        }

        if report.is_empty() {
            report.push_str("No changes.\n");
        }
        if !unchanged.is_empty() {
            let _ = writeln!(report, "Unchanged: {}", unchanged.join(", "));
        }
        report
    }
}

#[async_trait]
impl TargetBackend for DryRunTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::DryRun
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
                CheckOutcome::Satisfied => Vec::new(),
                CheckOutcome::Changes(changes) => changes,
            }
        } else {
            task.desired()
        };

        let changes: Vec<Change> = changes
            .into_iter()
            .map(|c| Change {
                desired: self.resolver.resolve(&c.desired),
                ..c
            })
            .collect();

        self.planned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), (task.kind(), changes.clone()));

        Ok(if changes.is_empty() {
            TaskOutcome::Skipped
        } else {
            TaskOutcome::Planned(changes)
        })
    }

    async fn finish(
        &self,
        graph: &TaskGraph,
        _result: &ExecutionResult,
    ) -> Result<(), ExecutorError> {
        let report = self.render_report(graph);
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(report.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Assembler, Fragment, RunTasksOptions, Scheduler};
    use crate::testing::{task_context, FixedDelay, MemoryHost, SharedBuffer, StubTask};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct MirrorResolver;

    impl AssetResolver for MirrorResolver {
        fn resolve(&self, location: &str) -> String {
            location.replace("converged", "converged@mirror")
        }
    }

    #[tokio::test]
    async fn report_lists_changes_in_dependency_order_without_mutating() {
        let mut fragment = Fragment::new();
        fragment
            .add("service", StubTask::with_deps(&["package"]))
            .add("package", StubTask::with_deps(&[]))
            .add("dirs", StubTask::satisfied());
        let mut assembler = Assembler::new();
        assembler.inject("test", fragment);
        let graph = assembler.assemble().await.unwrap();

        let host = Arc::new(MemoryHost::default());
        let buffer = SharedBuffer::default();
        let target = DryRunTarget::new(Arc::new(MirrorResolver), Box::new(buffer.clone()));
        let scheduler = Scheduler::new(
            Arc::new(FixedDelay(Duration::from_secs(1))),
            RunTasksOptions::default(),
        );

        let result = scheduler
            .run(&graph, &target, &task_context(host.clone()), true)
            .await
            .unwrap();
        target.finish(&graph, &result).await.unwrap();

        assert_eq!(
            buffer.contents(),
            "Stub package\n  state: <none> -> converged@mirror\n\n\
             Stub service\n  state: <none> -> converged@mirror\n\n\
             Unchanged: dirs\n"
        );
        assert_eq!(host.mutations(), 0);
        assert_eq!(result.applied(), 0);
    }

    #[tokio::test]
    async fn empty_plan_says_so() {
        let mut fragment = Fragment::new();
        fragment.add("dirs", StubTask::satisfied());
        let mut assembler = Assembler::new();
        assembler.inject("test", fragment);
        let graph = assembler.assemble().await.unwrap();

        let buffer = SharedBuffer::default();
        let target = DryRunTarget::new(Arc::new(crate::model::PassthroughResolver), Box::new(buffer.clone()));
        let ctx = task_context(Arc::new(MemoryHost::default()));
        let outcome = target.execute(&TaskKey::new("dirs"), &StubTask::satisfied(), &ctx, true).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Skipped);

        target.finish(&graph, &ExecutionResult::default()).await.unwrap();
        assert_eq!(buffer.contents(), "No changes.\nUnchanged: dirs\n");
    }

    #[tokio::test]
    async fn poisoned_plan_still_records_changes() {
        let mut fragment = Fragment::new();
        fragment.add("package", StubTask::with_deps(&[]));
        let mut assembler = Assembler::new();
        assembler.inject("test", fragment);
        let graph = assembler.assemble().await.unwrap();

        let buffer = SharedBuffer::default();
        let target = DryRunTarget::new(Arc::new(crate::model::PassthroughResolver), Box::new(buffer.clone()));
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _planned = target.planned.lock().unwrap();
            panic!("poison the plan");
        }));
        assert!(target.planned.is_poisoned());

        let ctx = task_context(Arc::new(MemoryHost::default()));
        target
            .execute(&TaskKey::new("package"), &StubTask::with_deps(&[]), &ctx, true)
            .await
            .unwrap();
        target.finish(&graph, &ExecutionResult::default()).await.unwrap();
        assert_eq!(buffer.contents(), "Stub package\n  state: <none> -> converged\n\n");
    }
}
