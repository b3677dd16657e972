use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{OutputSink, TargetBackend, TargetKind};
use crate::error::{ExecutorError, TaskError};
use crate::executor::types::{ExecutionResult, NodeTask, TaskContext, TaskOutcome};
use crate::executor::{TaskGraph, TaskKey};

/// Compiles the whole graph into one first-boot script. The target machine
/// has no prior state, so nothing is checked and every step is emitted.
pub struct CloudInitTarget {
    tags: BTreeSet<String>,
    out: Mutex<OutputSink>,
    steps: Mutex<HashMap<TaskKey, (&'static str, Vec<String>)>>,
}

impl CloudInitTarget {
    pub fn new(out: OutputSink, tags: BTreeSet<String>) -> Self {
        Self {
            tags,
            out: Mutex::new(out),
            steps: Mutex::new(HashMap::new()),
        }
    }

    fn render_script(&self, graph: &TaskGraph) -> Result<String, ExecutorError> {
        let steps = self.steps.lock().unwrap_or_else(PoisonError::into_inner);

        let mut script = String::new();
        script.push_str("#!/bin/bash\n");
        let _ = writeln!(
            script,
            "# Generated by nodeup at {}",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        );
        if !self.tags.is_empty() {
            let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
            let _ = writeln!(script, "# Node tags: {}", tags.join(","));
        }
        script.push_str("set -o errexit\nset -o nounset\nset -o pipefail\n");

        let order = graph.topological_order();
        let total = order.len();

        let mut preamble: Vec<String> = Vec::new();
        for task in order.iter().filter_map(|key| graph.get(key)) {
            for line in task.script_preamble() {
                if !preamble.contains(&line) {
                    preamble.push(line);
                }
            }
        }
        if !preamble.is_empty() {
            script.push_str("\n# Prepare\n");
            for line in &preamble {
                script.push_str(line);
                script.push('\n');
            }
        }

        for (i, key) in order.into_iter().enumerate() {
            let Some((kind, lines)) = steps.get(&key) else {
                return Err(ExecutorError::Finish {
                    target: "cloudinit",
                    message: format!("task {key} was never rendered"),
                });
            };
            let _ = writeln!(script, "\n# [{}/{}] {} {}", i + 1, total, kind, key);
            for line in lines {
                script.push_str(line);
                script.push('\n');
            }
        }

        Ok(script)
    }
}

#[async_trait]
impl TargetBackend for CloudInitTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::CloudInit
    }

    fn checks_existing_state(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        key: &TaskKey,
        task: &dyn NodeTask,
        _ctx: &TaskContext,
        _check_existing: bool,
    ) -> Result<TaskOutcome, TaskError> {
        let lines = task.render_script()?;
        self.steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), (task.kind(), lines.clone()));
        Ok(TaskOutcome::Rendered(lines))
    }

    async fn finish(
        &self,
        graph: &TaskGraph,
        _result: &ExecutionResult,
    ) -> Result<(), ExecutorError> {
        let script = self.render_script(graph)?;
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(script.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Assembler, Fragment, RunTasksOptions, Scheduler};
    use crate::testing::{task_context, FixedDelay, MemoryHost, RecordingTask, SharedBuffer};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn script_emits_every_task_in_dependency_order() {
        let log = RecordingTask::log();
        let mut fragment = Fragment::new();
        fragment
            .add("service", RecordingTask::new("service", &log).after(&["package"]))
            .add("package", RecordingTask::new("package", &log));
        let mut assembler = Assembler::new();
        assembler.inject("test", fragment);
        let graph = assembler.assemble().await.unwrap();

        let buffer = SharedBuffer::default();
        let tags: BTreeSet<String> = ["_amd64".to_string(), "_systemd".to_string()].into();
        let target = CloudInitTarget::new(Box::new(buffer.clone()), tags);
        let host = Arc::new(MemoryHost::default());
        let scheduler = Scheduler::new(
            Arc::new(FixedDelay(Duration::from_secs(1))),
            RunTasksOptions::default(),
        );

        let result = scheduler
            .run(&graph, &target, &task_context(host.clone()), false)
            .await
            .unwrap();
        target.finish(&graph, &result).await.unwrap();

        let script = buffer.contents();
        assert!(script.starts_with("#!/bin/bash\n# Generated by nodeup at "));
        assert!(script.contains("# Node tags: _amd64,_systemd\n"));
        assert!(script.contains("set -o errexit\nset -o nounset\nset -o pipefail\n"));
        let package = script.find("# [1/2] Recording package\necho package\n").unwrap();
        let service = script.find("# [2/2] Recording service\necho service\n").unwrap();
        assert!(package < service);

        // Nothing on the build host is touched and no task is applied.
        assert_eq!(host.mutations(), 0);
        assert_eq!(RecordingTask::attempts(&log, "package"), 0);
    }

    #[derive(Debug)]
    struct AptPackage(&'static str);

    #[async_trait]
    impl NodeTask for AptPackage {
        fn kind(&self) -> &'static str {
            "Package"
        }

        fn desired(&self) -> Vec<crate::executor::types::Change> {
            Vec::new()
        }

        async fn check(
            &self,
            _ctx: &TaskContext,
        ) -> Result<crate::executor::types::CheckOutcome, TaskError> {
            Ok(crate::executor::types::CheckOutcome::Satisfied)
        }

        async fn apply(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
            Ok(())
        }

        fn render_script(&self) -> Result<Vec<String>, TaskError> {
            Ok(vec![format!("apt-get install --yes {}", self.0)])
        }

        fn script_preamble(&self) -> Vec<String> {
            vec!["apt-get update".to_string()]
        }
    }

    #[tokio::test]
    async fn shared_preamble_is_emitted_once() {
        let mut fragment = Fragment::new();
        fragment
            .add("package:socat", AptPackage("socat"))
            .add("package:conntrack", AptPackage("conntrack"));
        let mut assembler = Assembler::new();
        assembler.inject("test", fragment);
        let graph = assembler.assemble().await.unwrap();

        let buffer = SharedBuffer::default();
        let target = CloudInitTarget::new(Box::new(buffer.clone()), BTreeSet::new());
        let scheduler = Scheduler::new(
            Arc::new(FixedDelay(Duration::from_secs(1))),
            RunTasksOptions::default(),
        );
        let host = Arc::new(MemoryHost::default());
        let result = scheduler
            .run(&graph, &target, &task_context(host), false)
            .await
            .unwrap();
        target.finish(&graph, &result).await.unwrap();

        let script = buffer.contents();
        assert_eq!(script.matches("apt-get update").count(), 1);
        let update = script.find("# Prepare\napt-get update\n").unwrap();
        let first_step = script.find("\n# [1/2]").unwrap();
        assert!(update < first_step);
        assert_eq!(script.matches("\n# [").count(), 2);
    }

    #[tokio::test]
    async fn poisoned_step_buffer_still_records_steps() {
        let log = RecordingTask::log();
        let mut fragment = Fragment::new();
        fragment.add("package", RecordingTask::new("package", &log));
        let mut assembler = Assembler::new();
        assembler.inject("test", fragment);
        let graph = assembler.assemble().await.unwrap();

        let buffer = SharedBuffer::default();
        let target = CloudInitTarget::new(Box::new(buffer.clone()), BTreeSet::new());
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _steps = target.steps.lock().unwrap();
            panic!("poison the step buffer");
        }));
        assert!(target.steps.is_poisoned());

        let key = TaskKey::new("package");
        let task = graph.get(&key).unwrap().clone();
        let ctx = task_context(Arc::new(MemoryHost::default()));
        target.execute(&key, task.as_ref(), &ctx, false).await.unwrap();
        target.finish(&graph, &ExecutionResult::default()).await.unwrap();

        assert!(buffer.contents().contains("# [1/1] Recording package\necho package\n"));
    }

    #[tokio::test]
    async fn unrendered_task_fails_finish() {
        let log = RecordingTask::log();
        let mut fragment = Fragment::new();
        fragment.add("package", RecordingTask::new("package", &log));
        let mut assembler = Assembler::new();
        assembler.inject("test", fragment);
        let graph = assembler.assemble().await.unwrap();

        let target = CloudInitTarget::new(Box::new(SharedBuffer::default()), BTreeSet::new());
        let err = target
            .finish(&graph, &ExecutionResult::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Finish { target: "cloudinit", .. }));
    }
}
