use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{ConfigError, ExecutorError};
use crate::host::HostSystem;
use crate::model::{CloudProvider, Keystore, SecretStore};
use crate::target::TargetBackend;

use super::graph::TaskGraph;
use super::scheduler::Scheduler;
use super::types::{ExecutionResult, TaskContext};

/// Everything a run needs besides the graph: the target backend and the
/// shared handles tasks see.
///
/// Dropping the context closes the cloud handle, whether the run succeeded
/// or not.
pub struct ExecutionContext {
    target: Box<dyn TargetBackend>,
    task_context: TaskContext,
    check_existing: bool,
}

impl ExecutionContext {
    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }

    pub fn target(&self) -> &dyn TargetBackend {
        self.target.as_ref()
    }

    pub fn task_context(&self) -> &TaskContext {
        &self.task_context
    }

    /// Whether tasks are checked against existing state before applying.
    /// Always false for targets that never look at the host.
    pub fn check_existing(&self) -> bool {
        self.check_existing
    }

    pub async fn run_tasks(
        &self,
        graph: &TaskGraph,
        scheduler: &Scheduler,
    ) -> Result<ExecutionResult, ExecutorError> {
        scheduler
            .run(graph, self.target.as_ref(), &self.task_context, self.check_existing)
            .await
    }

    pub async fn finish(
        &self,
        graph: &TaskGraph,
        result: &ExecutionResult,
    ) -> Result<(), ExecutorError> {
        self.target.finish(graph, result).await
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        if let Some(cloud) = self.task_context.cloud.take() {
            tracing::debug!(provider = cloud.name(), "closing cloud provider");
            cloud.close();
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("target", &self.target.kind())
            .field("task_context", &self.task_context)
            .field("check_existing", &self.check_existing)
            .finish()
    }
}

#[derive(Default)]
pub struct ExecutionContextBuilder {
    target: Option<Box<dyn TargetBackend>>,
    host: Option<Arc<dyn HostSystem>>,
    keystore: Option<Arc<dyn Keystore>>,
    secrets: Option<Arc<dyn SecretStore>>,
    config_base: Option<PathBuf>,
    check_existing: bool,
    cloud: Option<Arc<dyn CloudProvider>>,
    tags: BTreeSet<String>,
}

impl ExecutionContextBuilder {
    pub fn target(mut self, target: Box<dyn TargetBackend>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn host(mut self, host: Arc<dyn HostSystem>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn keystore(mut self, keystore: Arc<dyn Keystore>) -> Self {
        self.keystore = Some(keystore);
        self
    }

    pub fn secret_store(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn config_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.config_base = Some(base.into());
        self
    }

    pub fn check_existing(mut self, check: bool) -> Self {
        self.check_existing = check;
        self
    }

    pub fn cloud(mut self, cloud: Arc<dyn CloudProvider>) -> Self {
        self.cloud = Some(cloud);
        self
    }

    pub fn tags(mut self, tags: BTreeSet<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn build(self) -> Result<ExecutionContext, ConfigError> {
        let target = self.target.ok_or(ConfigError::MissingField("target"))?;
        let host = self.host.ok_or(ConfigError::MissingField("host"))?;
        let keystore = self.keystore.ok_or(ConfigError::MissingField("keystore"))?;
        let secrets = self.secrets.ok_or(ConfigError::MissingField("secret store"))?;
        let config_base = self
            .config_base
            .ok_or(ConfigError::MissingField("config base"))?;

        let check_existing = self.check_existing && target.checks_existing_state();
        if self.check_existing && !check_existing {
            tracing::debug!(target = %target.kind(), "target does not inspect existing state");
        }

        Ok(ExecutionContext {
            target,
            task_context: TaskContext {
                host,
                keystore,
                secrets,
                config_base,
                cloud: self.cloud,
                tags: self.tags,
            },
            check_existing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Assembler, Fragment, RunTasksOptions};
    use crate::error::TaskError;
    use crate::target::{CloudInitTarget, DirectTarget};
    use crate::testing::{
        CountingCloud, EmptyStores, FixedDelay, MemoryHost, RecordingTask, SharedBuffer,
    };
    use std::time::Duration;

    fn builder(host: Arc<MemoryHost>) -> ExecutionContextBuilder {
        ExecutionContext::builder()
            .host(host)
            .keystore(Arc::new(EmptyStores))
            .secret_store(Arc::new(EmptyStores))
            .config_base("/srv/config")
    }

    #[test]
    fn missing_target_is_a_config_error() {
        let err = builder(Arc::new(MemoryHost::default())).build().unwrap_err();
        assert_eq!(err.to_string(), "target is required");
    }

    #[test]
    fn missing_keystore_is_a_config_error() {
        let err = ExecutionContext::builder()
            .target(Box::new(DirectTarget))
            .host(Arc::new(MemoryHost::default()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("keystore")));
    }

    #[test]
    fn script_target_never_checks_existing_state() {
        let ctx = builder(Arc::new(MemoryHost::default()))
            .target(Box::new(CloudInitTarget::new(
                Box::new(SharedBuffer::default()),
                BTreeSet::new(),
            )))
            .check_existing(true)
            .build()
            .unwrap();
        assert!(!ctx.check_existing());
    }

    #[tokio::test(start_paused = true)]
    async fn cloud_handle_closed_after_failed_run() {
        let cloud = Arc::new(CountingCloud::default());
        let log = RecordingTask::log();
        let mut fragment = Fragment::new();
        fragment.add(
            "broken",
            RecordingTask::new("broken", &log).always_failing(TaskError::fatal("boom")),
        );
        let mut assembler = Assembler::new();
        assembler.inject("test", fragment);
        let graph = assembler.assemble().await.unwrap();

        let scheduler = Scheduler::new(
            Arc::new(FixedDelay(Duration::from_secs(1))),
            RunTasksOptions::default(),
        );
        {
            let ctx = builder(Arc::new(MemoryHost::default()))
                .target(Box::new(DirectTarget))
                .cloud(cloud.clone())
                .build()
                .unwrap();
            assert!(ctx.run_tasks(&graph, &scheduler).await.is_err());
            assert_eq!(cloud.closed(), 0);
        }
        assert_eq!(cloud.closed(), 1);
    }
}
