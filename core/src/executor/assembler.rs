use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AssemblyError;
use crate::executor::graph::{Fragment, TaskGraph};
use crate::executor::traits::Builder;
use crate::executor::types::NodeTask;
use crate::executor::TaskKey;

/// Merges builder fragments and injected tasks into one validated graph.
///
/// Key uniqueness, reference resolution and acyclicity are all enforced here,
/// before anything executes.
#[derive(Default)]
pub struct Assembler {
    builders: Vec<Arc<dyn Builder>>,
    injected: Vec<(String, Fragment)>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, builder: impl Builder + 'static) -> Self {
        self.builders.push(Arc::new(builder));
        self
    }

    pub fn add_builder(&mut self, builder: Arc<dyn Builder>) -> &mut Self {
        self.builders.push(builder);
        self
    }

    /// Add tasks that do not come from a builder. `source` names them in
    /// duplicate-key errors.
    pub fn inject(&mut self, source: impl Into<String>, fragment: Fragment) -> &mut Self {
        self.injected.push((source.into(), fragment));
        self
    }

    /// Add a homogeneous collection keyed `"<kind>.<index>"`.
    pub fn inject_indexed(&mut self, kind: &str, tasks: Vec<Arc<dyn NodeTask>>) -> &mut Self {
        let mut fragment = Fragment::new();
        for (i, task) in tasks.into_iter().enumerate() {
            fragment.add_shared(TaskKey::indexed(kind, i), task);
        }
        self.inject(kind, fragment)
    }

    pub async fn assemble(self) -> Result<TaskGraph, AssemblyError> {
        let mut sources: HashMap<TaskKey, String> = HashMap::new();
        let mut entries = Vec::new();

        let mut fragments = Vec::with_capacity(self.builders.len() + self.injected.len());
        for builder in &self.builders {
            let fragment = builder
                .build()
                .await
                .map_err(|source| AssemblyError::Builder {
                    builder: builder.name().to_string(),
                    source,
                })?;
            tracing::debug!(builder = builder.name(), tasks = fragment.len(), "builder done");
            fragments.push((builder.name().to_string(), fragment));
        }
        fragments.extend(self.injected);

        for (source, fragment) in fragments {
            for (key, task) in fragment.into_entries() {
                if let Some(first) = sources.get(&key) {
                    return Err(AssemblyError::DuplicateKey {
                        key,
                        first: first.clone(),
                        second: source,
                    });
                }
                sources.insert(key.clone(), source.clone());
                entries.push((key, task));
            }
        }

        let graph = TaskGraph::from_entries(entries)?;
        tracing::info!(tasks = graph.len(), "task graph assembled");
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubBuilder, StubTask};

    #[tokio::test]
    async fn graph_is_union_of_contributions() {
        let mut assembler = Assembler::new()
            .register(StubBuilder::new("sysctl", &[("sysctl-config", &[])]))
            .register(StubBuilder::new("docker", &[("docker-package", &[]), ("docker-service", &["docker-package"])]));
        assembler.inject_indexed(
            "LoadImage",
            vec![Arc::new(StubTask::with_deps(&["docker-service"])) as Arc<dyn NodeTask>],
        );

        let graph = assembler.assemble().await.unwrap();
        let mut keys: Vec<&str> = graph.keys().iter().map(TaskKey::as_str).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["LoadImage.0", "docker-package", "docker-service", "sysctl-config"]
        );
    }

    #[tokio::test]
    async fn duplicate_key_names_both_sources() {
        let assembler = Assembler::new()
            .register(StubBuilder::new("files", &[("kubelet-config", &[])]))
            .register(StubBuilder::new("kubelet", &[("kubelet-config", &[])]));

        match assembler.assemble().await.unwrap_err() {
            AssemblyError::DuplicateKey { key, first, second } => {
                assert_eq!(key.as_str(), "kubelet-config");
                assert_eq!(first, "files");
                assert_eq!(second, "kubelet");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn injected_task_cannot_shadow_builder_key() {
        let mut assembler = Assembler::new().register(StubBuilder::new("images", &[("LoadImage.0", &[])]));
        assembler.inject_indexed("LoadImage", vec![Arc::new(StubTask::satisfied()) as Arc<dyn NodeTask>]);

        let err = assembler.assemble().await.unwrap_err();
        assert!(matches!(err, AssemblyError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn builder_failure_aborts_assembly() {
        let assembler = Assembler::new()
            .register(StubBuilder::new("ok", &[("a", &[])]))
            .register(StubBuilder::failing("broken"));

        match assembler.assemble().await.unwrap_err() {
            AssemblyError::Builder { builder, .. } => assert_eq!(builder, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn registration_order_does_not_matter_for_references() {
        // The service is registered before the package it references.
        let assembler = Assembler::new()
            .register(StubBuilder::new("service", &[("svc", &["pkg"])]))
            .register(StubBuilder::new("package", &[("pkg", &[])]));

        let graph = assembler.assemble().await.unwrap();
        assert_eq!(
            graph.topological_order(),
            vec![TaskKey::new("pkg"), TaskKey::new("svc")]
        );
    }
}
