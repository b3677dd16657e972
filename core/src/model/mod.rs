//! The read-only model every builder works from.

mod assets;
mod evaluate;
mod platform;
mod stores;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

pub use assets::{Asset, AssetResolver, AssetStore, PassthroughResolver};
pub use evaluate::{evaluate_bind_address, evaluate_hostname_override, evaluate_spec};
pub use platform::{Architecture, Distribution, DistributionFamily};
pub use stores::{CloudProvider, Keystore, SecretStore};

use crate::config::{ClusterSpec, InstanceGroupRole, InstanceGroupSpec, NodeupConfig};

/// Shared inputs for builders. Built once per run, never mutated afterwards.
pub struct ModelContext {
    pub architecture: Architecture,
    pub distribution: Distribution,
    pub cluster: ClusterSpec,
    pub instance_group: Option<InstanceGroupSpec>,
    pub config: NodeupConfig,
    pub config_base: PathBuf,
    pub assets: AssetStore,
    pub keystore: Arc<dyn Keystore>,
    pub secrets: Arc<dyn SecretStore>,
    pub tags: BTreeSet<String>,
}

impl ModelContext {
    pub fn role(&self) -> InstanceGroupRole {
        self.instance_group
            .as_ref()
            .map(|ig| ig.role)
            .unwrap_or_default()
    }

    pub fn is_master(&self) -> bool {
        self.role() == InstanceGroupRole::Master
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn uses_docker(&self) -> bool {
        self.cluster.container_runtime == "docker"
    }

    /// Config tags, then architecture and distribution tags.
    pub fn node_tags(
        config: &NodeupConfig,
        architecture: Architecture,
        distribution: &Distribution,
    ) -> BTreeSet<String> {
        let mut tags: BTreeSet<String> = config.tags.iter().cloned().collect();
        tags.extend(architecture.build_tags());
        tags.extend(distribution.build_tags());
        tags
    }
}

impl std::fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelContext")
            .field("architecture", &self.architecture)
            .field("distribution", &self.distribution)
            .field("config_base", &self.config_base)
            .field("role", &self.role())
            .field("tags", &self.tags)
            .finish()
    }
}
