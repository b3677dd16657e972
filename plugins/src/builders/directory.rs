use std::sync::Arc;

use async_trait::async_trait;

use nodeup_core::api::{Builder, Fragment, ModelContext};

use crate::nodetasks::FileTask;

const BASE_DIRECTORIES: &[&str] = &["/srv/kubernetes", "/var/lib/kubelet"];
const MASTER_DIRECTORIES: &[&str] = &["/etc/kubernetes/manifests", "/srv/kubernetes/pki"];

/// Base directories every node needs, plus the asset cache.
pub struct DirectoryBuilder {
    ctx: Arc<ModelContext>,
}

impl DirectoryBuilder {
    pub fn new(ctx: Arc<ModelContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Builder for DirectoryBuilder {
    fn name(&self) -> &str {
        "directory"
    }

    async fn build(&self) -> anyhow::Result<Fragment> {
        let mut fragment = Fragment::new();
        let mut dirs: Vec<&str> = BASE_DIRECTORIES.to_vec();
        if self.ctx.is_master() {
            dirs.extend_from_slice(MASTER_DIRECTORIES);
        }
        for dir in dirs {
            let task = FileTask::directory(dir, 0o755);
            fragment.add(task.key(), task);
        }

        let cache = FileTask::directory(self.ctx.assets.cache_dir(), 0o755);
        fragment.add(cache.key(), cache);
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::fixtures::model;
    use nodeup_core::api::{ClusterSpec, Distribution, InstanceGroupRole, InstanceGroupSpec};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn masters_get_extra_directories() {
        let node = model(Distribution::Ubuntu, ClusterSpec::default(), None);
        let master = model(
            Distribution::Ubuntu,
            ClusterSpec::default(),
            Some(InstanceGroupSpec {
                name: "master-a".into(),
                role: InstanceGroupRole::Master,
                ..Default::default()
            }),
        );

        let node_keys: Vec<String> = DirectoryBuilder::new(node)
            .build()
            .await
            .unwrap()
            .keys()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(
            node_keys,
            vec![
                "file:/srv/kubernetes",
                "file:/var/lib/kubelet",
                "file:/var/cache/nodeup"
            ]
        );

        let master_tasks = DirectoryBuilder::new(master).build().await.unwrap();
        assert_eq!(master_tasks.len(), 5);
    }
}
