//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `nodeup_core::api` instead of reaching into internal modules.

pub use crate::config::{
    infer_config_base, load_app_config, local_path, read_location, AppConfig, AssetsSpec,
    ClusterSpec, DockerConfig, FileAssetSpec, ImageSpec, InstanceGroupRole, InstanceGroupSpec,
    KubeProxyConfig, KubeletConfig, LoggingConfig, NodeInputs, NodeupConfig,
};
pub use crate::error::{
    AssemblyError, ConfigError, ExecutorError, HostError, MetadataLookupError, NodeupError,
    ProbeError, TaskError,
};
pub use crate::executor::{
    Assembler, Builder, Change, CheckOutcome, ExecutionConfig, ExecutionContext,
    ExecutionResult, Fragment, NodeTask, RetryStrategyPlugin, RunTasksOptions, Scheduler,
    TaskContext, TaskGraph, TaskKey, TaskOutcome, TaskResult, MAX_TASK_DURATION,
};
pub use crate::host::{argv, CommandOutput, HostSystem, PathInfo};
pub use crate::model::{
    evaluate_spec, Architecture, Asset, AssetResolver, AssetStore, CloudProvider, Distribution,
    DistributionFamily, Keystore, ModelContext, PassthroughResolver, SecretStore,
};
pub use crate::negotiate::{
    select_storage_driver, CapabilityDecision, CapabilityProbe, Negotiator,
};
pub use crate::target::{
    CloudInitTarget, DirectTarget, DryRunTarget, OutputSink, TargetBackend, TargetKind,
};
