use std::path::PathBuf;
use std::sync::Arc;

use nodeup_core::api::{
    Architecture, AssetStore, ClusterSpec, Distribution, ExecutionContext, InstanceGroupSpec,
    ModelContext, NodeupConfig, RunTasksOptions, Scheduler, TargetBackend,
};
use nodeup_core::testing::{EmptyStores, FixedDelay, MemoryHost, MemoryStores};
use std::time::Duration;

/// A node on an image without a known package manager, running containerd:
/// only files, directories and their change hooks end up in the graph.
pub fn files_only_model(cluster: ClusterSpec, ig: Option<InstanceGroupSpec>) -> Arc<ModelContext> {
    let stores = Arc::new(MemoryStores::cluster());
    let distribution = Distribution::Flatcar;
    let config = NodeupConfig::default();
    let tags = ModelContext::node_tags(&config, Architecture::Amd64, &distribution);
    Arc::new(ModelContext {
        architecture: Architecture::Amd64,
        distribution,
        cluster: ClusterSpec {
            container_runtime: "containerd".into(),
            ..cluster
        },
        instance_group: ig,
        config,
        config_base: PathBuf::from("/srv/state/cluster.example.com"),
        assets: AssetStore::new("/var/cache/nodeup"),
        keystore: stores.clone(),
        secrets: stores,
        tags,
    })
}

pub fn context(host: Arc<MemoryHost>, target: Box<dyn TargetBackend>) -> ExecutionContext {
    ExecutionContext::builder()
        .target(target)
        .host(host)
        .keystore(Arc::new(EmptyStores))
        .secret_store(Arc::new(EmptyStores))
        .config_base("/srv/state/cluster.example.com")
        .check_existing(true)
        .build()
        .expect("execution context")
}

pub fn scheduler() -> Scheduler {
    Scheduler::new(
        Arc::new(FixedDelay(Duration::from_millis(10))),
        RunTasksOptions {
            max_task_duration: Duration::from_secs(5),
            max_concurrency: 4,
        },
    )
}
