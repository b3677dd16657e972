use std::collections::BTreeSet;
use std::sync::Arc;

use nodeup_core::api::{
    AssetResolver, Builder, CloudInitTarget, DirectTarget, DryRunTarget, ModelContext, NodeTask,
    OutputSink, RetryStrategyPlugin, TargetBackend, TargetKind,
};
use nodeup_core::executor::types::RetryConfig;

use crate::builders::{self, DOCKER_SERVICE};
use crate::executor::strategies::{ExponentialBackoffPlugin, FixedRetryPlugin, LinearRetryPlugin};
use crate::nodetasks::{LoadImageTask, ServiceTask};

pub fn build_target(
    kind: TargetKind,
    out: OutputSink,
    resolver: Arc<dyn AssetResolver>,
    tags: BTreeSet<String>,
) -> Box<dyn TargetBackend> {
    match kind {
        TargetKind::Direct => Box::new(DirectTarget::new()),
        TargetKind::DryRun => Box::new(DryRunTarget::new(resolver, out)),
        TargetKind::CloudInit => Box::new(CloudInitTarget::new(out, tags)),
    }
}

pub fn build_retry_strategy(cfg: &RetryConfig) -> Arc<dyn RetryStrategyPlugin> {
    match cfg.strategy.as_str() {
        "fixed" => Arc::new(FixedRetryPlugin::new(cfg.clone())),
        "exponential-backoff" => Arc::new(ExponentialBackoffPlugin::new(cfg.clone())),
        "linear" => Arc::new(LinearRetryPlugin::new(cfg.clone())),
        other => {
            tracing::warn!(strategy = other, "unknown retry strategy, using fixed");
            Arc::new(FixedRetryPlugin::new(cfg.clone()))
        }
    }
}

pub fn build_builders(ctx: &Arc<ModelContext>) -> Vec<Arc<dyn Builder>> {
    builders::all(ctx)
}

/// One load task per image configured for this node's architecture.
pub fn build_image_tasks(ctx: &ModelContext) -> Vec<Arc<dyn NodeTask>> {
    let Some(images) = ctx.config.images.get(&ctx.architecture) else {
        return Vec::new();
    };
    let runtime = ctx.cluster.container_runtime.as_str();
    images
        .iter()
        .map(|image| {
            let mut task = LoadImageTask::new(
                image.sources.clone(),
                image.hash.as_str(),
                runtime,
                ctx.assets.cache_dir(),
            );
            if ctx.uses_docker() {
                task = task.after([ServiceTask::key_for(DOCKER_SERVICE)]);
            }
            Arc::new(task) as Arc<dyn NodeTask>
        })
        .collect()
}
