use std::sync::Arc;

use nodeup_core::api::{
    evaluate_spec, AppConfig, Architecture, Assembler, AssetStore, CapabilityProbe,
    CloudProvider, ConfigError, Distribution, ExecutionContext, ExecutionResult, HostSystem,
    ModelContext, NodeInputs, NodeupError, OutputSink, RunTasksOptions, Scheduler, TargetKind,
};
use nodeup_plugins::assets::MirrorAssetResolver;
use nodeup_plugins::factory::{
    build_builders, build_image_tasks, build_retry_strategy, build_target,
};
use nodeup_plugins::host::LocalHost;
use nodeup_plugins::kernel::{ensure_kernel_module, KernelFilesystems};
use nodeup_plugins::stores::build_stores;

use crate::commands::cli::Args;

/// Run node-up against the real machine (or the image mounted at `--fs-root`).
pub async fn run_node_up(args: &Args, cfg: &AppConfig) -> Result<ExecutionResult, NodeupError> {
    check_required(args)?;
    let host: Arc<dyn HostSystem> = Arc::new(LocalHost::new(&args.fs_root)?);
    let out_path = args.out.clone();
    let open_output = move || -> std::io::Result<OutputSink> {
        let out: OutputSink = match out_path {
            Some(path) => Box::new(std::fs::File::create(path)?),
            None => Box::new(std::io::stdout()),
        };
        Ok(out)
    };
    node_up(args, cfg, host, None, open_output).await
}

/// Required inputs, checked before anything is loaded.
pub fn check_required(args: &Args) -> Result<(), ConfigError> {
    if args.fs_root.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("FSRoot"));
    }
    if args.conf.as_deref().map_or(true, str::is_empty) {
        return Err(ConfigError::MissingField("ConfigLocation"));
    }
    if args.cache_dir.as_os_str().is_empty() {
        return Err(ConfigError::MissingField("CacheDir"));
    }
    Ok(())
}

fn target_kind(args: &Args, cfg: &AppConfig) -> Result<TargetKind, ConfigError> {
    args.target.as_deref().unwrap_or(&cfg.target).parse()
}

/// Load inputs, evaluate the cluster spec, assemble the task graph and execute it on
/// the chosen target.
///
/// `open_output` is only called once the task graph has been assembled, so a
/// run that fails validation never truncates an earlier report or script.
pub async fn node_up<F>(
    args: &Args,
    cfg: &AppConfig,
    host: Arc<dyn HostSystem>,
    cloud: Option<Arc<dyn CloudProvider>>,
    open_output: F,
) -> Result<ExecutionResult, NodeupError>
where
    F: FnOnce() -> std::io::Result<OutputSink>,
{
    check_required(args)?;
    let kind = target_kind(args, cfg)?;
    let conf = args.conf.as_deref().unwrap_or_default();

    let NodeInputs {
        mut config,
        mut cluster,
        instance_group,
        config_base,
    } = NodeInputs::load(conf).await?;

    // Only a direct run may load kernel modules.
    let probe: Box<dyn CapabilityProbe> = match kind {
        TargetKind::Direct => Box::new(KernelFilesystems::new(host.clone())),
        _ => Box::new(KernelFilesystems::read_only(host.clone())),
    };
    evaluate_spec(&mut cluster, &mut config, probe.as_ref(), cloud.as_deref()).await?;

    let architecture = Architecture::current()?;
    let distribution = Distribution::detect(&args.fs_root)?;
    let tags = ModelContext::node_tags(&config, architecture, &distribution);
    tracing::info!(config_tags = ?config.tags, "Config tags");
    tracing::info!(arch_tags = ?architecture.build_tags(), "Arch tags");
    tracing::info!(distro_tags = ?distribution.build_tags(), "Distro tags");

    let mut assets = AssetStore::new(&args.cache_dir);
    for asset in config.assets.get(&architecture).into_iter().flatten() {
        assets.add(asset)?;
    }

    let (keystore, secrets) = build_stores(&cluster)?;

    if kind == TargetKind::Direct {
        ensure_kernel_module(host.as_ref(), "br_netfilter").await;
    }

    let resolver = Arc::new(MirrorAssetResolver::new(cluster.assets.as_ref()));
    let model = Arc::new(ModelContext {
        architecture,
        distribution,
        cluster,
        instance_group,
        config,
        config_base: config_base.clone(),
        assets,
        keystore: keystore.clone(),
        secrets: secrets.clone(),
        tags: tags.clone(),
    });

    let mut assembler = Assembler::new();
    for builder in build_builders(&model) {
        assembler.add_builder(builder);
    }
    assembler.inject_indexed("LoadImage", build_image_tasks(&model));
    let graph = assembler.assemble().await?;

    let target = build_target(kind, open_output()?, resolver, tags.clone());
    let mut ctx = ExecutionContext::builder()
        .target(target)
        .host(host)
        .keystore(keystore)
        .secret_store(secrets)
        .config_base(config_base)
        .tags(tags)
        .check_existing(true);
    if let Some(cloud) = cloud {
        ctx = ctx.cloud(cloud);
    }
    let ctx = ctx.build()?;

    let scheduler = Scheduler::new(
        build_retry_strategy(&cfg.executor.retry),
        RunTasksOptions::from_config(&cfg.executor),
    );
    let result = ctx.run_tasks(&graph, &scheduler).await?;
    ctx.finish(&graph, &result).await?;

    tracing::info!(
        target_kind = %kind,
        tasks = result.total_tasks,
        applied = result.applied(),
        skipped = result.skipped(),
        retries = result.retries(),
        duration_ms = result.duration_ms,
        "node-up complete"
    );
    Ok(result)
}

