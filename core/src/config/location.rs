use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use super::document::{ClusterSpec, InstanceGroupSpec, NodeupConfig};
use crate::error::ConfigError;

/// File name of the completed cluster spec under the config base.
pub const CLUSTER_COMPLETED_SPEC: &str = "cluster-completed.spec";

/// All documents one run reads, loaded before anything else happens.
#[derive(Debug, Clone)]
pub struct NodeInputs {
    pub config: NodeupConfig,
    pub cluster: ClusterSpec,
    pub instance_group: Option<InstanceGroupSpec>,
    pub config_base: PathBuf,
}

impl NodeInputs {
    pub async fn load(config_location: &str) -> Result<Self, ConfigError> {
        let config: NodeupConfig = read_yaml("configuration", config_location).await?;
        let config_base = local_path(&infer_config_base(&config)?)?;

        let cluster_location = match config.cluster_location.as_deref() {
            Some(loc) if !loc.is_empty() => loc.to_string(),
            _ => config_base
                .join(CLUSTER_COMPLETED_SPEC)
                .to_string_lossy()
                .to_string(),
        };
        let cluster: ClusterSpec = read_yaml("Cluster", &cluster_location).await?;

        let instance_group = match config.instance_group_name.as_deref() {
            Some(name) if !name.is_empty() => {
                let location = config_base.join("instancegroup").join(name);
                Some(read_yaml("InstanceGroup", &location.to_string_lossy()).await?)
            }
            _ => {
                tracing::warn!("No instance group defined in nodeup config");
                None
            }
        };

        Ok(Self {
            config,
            cluster,
            instance_group,
            config_base,
        })
    }
}

/// The config base: explicit, else the cluster location's parent directory.
pub fn infer_config_base(config: &NodeupConfig) -> Result<String, ConfigError> {
    if let Some(base) = config.config_base.as_deref().filter(|s| !s.is_empty()) {
        return Ok(base.to_string());
    }

    if let Some(location) = config.cluster_location.as_deref().filter(|s| !s.is_empty()) {
        let base = match location.rfind('/') {
            Some(i) => &location[..i],
            None => location,
        };
        return Ok(base.to_string());
    }

    Err(ConfigError::MissingField("ConfigBase"))
}

/// Read a local path or `file://` location.
pub async fn read_location(what: &'static str, location: &str) -> Result<Vec<u8>, ConfigError> {
    let path = local_path(location)?;
    tokio::fs::read(&path)
        .await
        .map_err(|source| ConfigError::Load {
            what,
            location: location.to_string(),
            source,
        })
}

async fn read_yaml<T: DeserializeOwned>(
    what: &'static str,
    location: &str,
) -> Result<T, ConfigError> {
    let bytes = read_location(what, location).await?;
    serde_yaml::from_slice(&bytes).map_err(|e| ConfigError::Parse {
        what,
        location: location.to_string(),
        message: e.to_string(),
    })
}

pub fn local_path(location: &str) -> Result<PathBuf, ConfigError> {
    if let Some(rest) = location.strip_prefix("file://") {
        return Ok(PathBuf::from(rest));
    }
    if location.contains("://") {
        return Err(ConfigError::UnsupportedLocation(location.to_string()));
    }
    Ok(Path::new(location).to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: Option<&str>, cluster: Option<&str>) -> NodeupConfig {
        NodeupConfig {
            config_base: base.map(str::to_string),
            cluster_location: cluster.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn explicit_config_base_wins() {
        let cfg = config(Some("/srv/base"), Some("/srv/other/cluster.spec"));
        assert_eq!(infer_config_base(&cfg).unwrap(), "/srv/base");
    }

    #[test]
    fn config_base_inferred_from_cluster_location() {
        let cfg = config(None, Some("file:///srv/state/c1/cluster-completed.spec"));
        assert_eq!(infer_config_base(&cfg).unwrap(), "file:///srv/state/c1");
    }

    #[test]
    fn missing_config_base_is_an_error() {
        let err = infer_config_base(&config(None, None)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("ConfigBase")));
    }

    #[test]
    fn remote_schemes_are_unsupported() {
        assert!(matches!(
            local_path("s3://bucket/cluster.spec"),
            Err(ConfigError::UnsupportedLocation(_))
        ));
        assert_eq!(
            local_path("file:///etc/nodeup.yaml").unwrap(),
            PathBuf::from("/etc/nodeup.yaml")
        );
    }

    #[tokio::test]
    async fn loads_all_documents_from_config_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path();
        std::fs::create_dir_all(base.join("instancegroup")).unwrap();
        std::fs::write(
            base.join(CLUSTER_COMPLETED_SPEC),
            "secretStore: /srv/secrets\nkeyStore: /srv/pki\n",
        )
        .unwrap();
        std::fs::write(base.join("instancegroup/nodes"), "name: nodes\nrole: Node\n").unwrap();
        let conf = base.join("nodeup.yaml");
        std::fs::write(
            &conf,
            format!(
                "configBase: {}\ninstanceGroupName: nodes\n",
                base.display()
            ),
        )
        .unwrap();

        let inputs = NodeInputs::load(&conf.to_string_lossy()).await.unwrap();
        assert_eq!(inputs.cluster.secret_store, "/srv/secrets");
        assert_eq!(inputs.instance_group.unwrap().name, "nodes");
        assert_eq!(inputs.config_base, base);
    }

    #[tokio::test]
    async fn unreadable_config_is_a_load_error() {
        let err = NodeInputs::load("/nonexistent/nodeup.yaml").await.unwrap_err();
        assert!(matches!(err, ConfigError::Load { what: "configuration", .. }));
    }
}
