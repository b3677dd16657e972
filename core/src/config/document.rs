//! Node configuration documents (YAML), as produced by the cluster
//! management side and read once per run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Architecture;

/// Per-node configuration: where the cluster lives and what this node needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeupConfig {
    #[serde(default)]
    pub config_base: Option<String>,

    #[serde(default)]
    pub cluster_location: Option<String>,

    #[serde(default)]
    pub instance_group_name: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Asset specs per architecture: `"<sha256>@<url>"` or a bare URL.
    #[serde(default)]
    pub assets: BTreeMap<Architecture, Vec<String>>,

    /// Container images to preload, per architecture.
    #[serde(default)]
    pub images: BTreeMap<Architecture, Vec<ImageSpec>>,

    #[serde(default)]
    pub hostname_override: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Mirrors to try in order.
    pub sources: Vec<String>,
    /// sha256 of the image tarball.
    pub hash: String,
}

/// The subset of the cluster specification the node agent reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default)]
    pub secret_store: String,

    #[serde(default)]
    pub key_store: String,

    #[serde(default = "default_container_runtime")]
    pub container_runtime: String,

    #[serde(default)]
    pub docker: Option<DockerConfig>,

    #[serde(default)]
    pub kubelet: Option<KubeletConfig>,

    #[serde(default)]
    pub master_kubelet: Option<KubeletConfig>,

    #[serde(default)]
    pub kube_proxy: Option<KubeProxyConfig>,

    #[serde(default)]
    pub sysctl_parameters: Vec<String>,

    #[serde(default)]
    pub file_assets: Vec<FileAssetSpec>,

    #[serde(default)]
    pub assets: Option<AssetsSpec>,
}

fn default_container_runtime() -> String {
    "docker".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerConfig {
    /// Storage driver, or a comma-separated precedence list to negotiate.
    #[serde(default)]
    pub storage: Option<String>,

    #[serde(default)]
    pub log_driver: Option<String>,

    #[serde(default)]
    pub log_opt: Vec<String>,

    #[serde(default)]
    pub insecure_registries: Vec<String>,

    #[serde(default)]
    pub registry_mirrors: Vec<String>,

    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfig {
    /// A literal name, `@hostname`, or `@aws`/`@gce`/`@digitalocean`/`@alicloud`.
    #[serde(default)]
    pub hostname_override: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeProxyConfig {
    #[serde(default)]
    pub hostname_override: Option<String>,

    #[serde(default)]
    pub bind_address: Option<String>,
}

/// Mirror locations for files and images.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetsSpec {
    #[serde(default)]
    pub file_repository: Option<String>,

    #[serde(default)]
    pub container_registry: Option<String>,
}

/// An arbitrary file to place on nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAssetSpec {
    pub name: String,
    pub path: String,
    pub content: String,
    /// Roles this applies to; empty means every role.
    #[serde(default)]
    pub roles: Vec<InstanceGroupRole>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceGroupRole {
    Master,
    #[default]
    Node,
    Bastion,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupSpec {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub role: InstanceGroupRole,

    #[serde(default)]
    pub sysctl_parameters: Vec<String>,

    #[serde(default)]
    pub file_assets: Vec<FileAssetSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_node_config_yaml() {
        let yaml = r#"
clusterLocation: /srv/state/cluster.example.com/cluster-completed.spec
instanceGroupName: nodes
tags: [_automatic_upgrades]
assets:
  amd64:
    - https://example.com/amd64/kubelet
  arm64:
    - https://example.com/arm64/kubelet
images:
  amd64:
    - sources: [https://example.com/protokube.tar.gz]
      hash: abc123
"#;
        let cfg: NodeupConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.instance_group_name.as_deref(), Some("nodes"));
        assert_eq!(cfg.assets[&Architecture::Amd64].len(), 1);
        assert_eq!(cfg.images[&Architecture::Amd64][0].hash, "abc123");
        assert!(cfg.config_base.is_none());
    }

    #[test]
    fn cluster_defaults_to_docker_runtime() {
        let cluster: ClusterSpec =
            serde_yaml::from_str("secretStore: /srv/secrets\nkeyStore: /srv/pki\n").unwrap();
        assert_eq!(cluster.container_runtime, "docker");
        assert!(cluster.docker.is_none());
    }

    #[test]
    fn instance_group_role_parses() {
        let ig: InstanceGroupSpec =
            serde_yaml::from_str("name: master-a\nrole: Master\n").unwrap();
        assert_eq!(ig.role, InstanceGroupRole::Master);
    }
}
