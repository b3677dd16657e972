use std::net::IpAddr;

use crate::config::{ClusterSpec, NodeupConfig};
use crate::error::{ConfigError, MetadataLookupError, NodeupError};
use crate::model::CloudProvider;
use crate::negotiate::{select_storage_driver, CapabilityProbe};

/// Resolve the symbolic and negotiable parts of the cluster spec in place, before any
/// builder sees it.
///
/// Provider sigils (`@aws`, `@gce`, ...) are answered from `cloud`'s instance
/// metadata; without a matching cloud handle they fail the run.
pub async fn evaluate_spec(
    cluster: &mut ClusterSpec,
    config: &mut NodeupConfig,
    probe: &dyn CapabilityProbe,
    cloud: Option<&dyn CloudProvider>,
) -> Result<(), NodeupError> {
    if let Some(kubelet) = cluster.kubelet.as_mut() {
        kubelet.hostname_override = evaluate_hostname_override(
            "kubelet.hostnameOverride",
            kubelet.hostname_override.as_deref(),
            cloud,
        )
        .await?;
    }
    if let Some(kubelet) = cluster.master_kubelet.as_mut() {
        kubelet.hostname_override = evaluate_hostname_override(
            "masterKubelet.hostnameOverride",
            kubelet.hostname_override.as_deref(),
            cloud,
        )
        .await?;
    }

    config.hostname_override = evaluate_hostname_override(
        "hostnameOverride",
        config.hostname_override.as_deref(),
        cloud,
    )
    .await?;

    if let Some(kube_proxy) = cluster.kube_proxy.as_mut() {
        kube_proxy.hostname_override = evaluate_hostname_override(
            "kubeProxy.hostnameOverride",
            kube_proxy.hostname_override.as_deref(),
            cloud,
        )
        .await?;
        kube_proxy.bind_address =
            evaluate_bind_address(kube_proxy.bind_address.as_deref(), cloud).await?;
    }

    if let Some(docker) = cluster.docker.as_mut() {
        docker.storage = select_storage_driver(docker.storage.as_deref(), probe).await;
    }

    Ok(())
}

/// `@hostname` and empty mean "use the machine hostname" (no override).
/// `@<provider>` values are read from that provider's instance metadata.
pub async fn evaluate_hostname_override(
    field: &'static str,
    value: Option<&str>,
    cloud: Option<&dyn CloudProvider>,
) -> Result<Option<String>, MetadataLookupError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "" | "@hostname" => Ok(None),
        "@aws" => {
            let lookup = MetadataLookup::new(field, value, "aws", cloud)?;
            lookup.read("meta-data/local-hostname").await.map(Some)
        }
        "@gce" => {
            // foo.c.project.internal => foo
            let lookup = MetadataLookup::new(field, value, "gce", cloud)?;
            let fqdn = lookup.read("instance/hostname").await?;
            let bare = fqdn.split('.').next().unwrap_or_default();
            Ok(Some(bare.to_string()))
        }
        "@digitalocean" => {
            let lookup = MetadataLookup::new(field, value, "digitalocean", cloud)?;
            lookup
                .read("interfaces/private/0/ipv4/address")
                .await
                .map(Some)
        }
        "@alicloud" => {
            let lookup = MetadataLookup::new(field, value, "alicloud", cloud)?;
            let zone = lookup.read("zone-id").await?;
            let instance = lookup.read("instance-id").await?;
            Ok(Some(format!("{zone}.{instance}")))
        }
        other if other.starts_with('@') => Err(MetadataLookupError {
            field,
            value: value.to_string(),
            reason: "unknown metadata provider".to_string(),
        }),
        _ => Ok(Some(value.to_string())),
    }
}

/// An IP address, or `@aws` for the instance's first local IPv4 address.
pub async fn evaluate_bind_address(
    value: Option<&str>,
    cloud: Option<&dyn CloudProvider>,
) -> Result<Option<String>, NodeupError> {
    const FIELD: &str = "kubeProxy.bindAddress";

    let Some(value) = value.filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value == "@aws" {
        let lookup = MetadataLookup::new(FIELD, value, "aws", cloud)?;
        let addresses = lookup.read("meta-data/local-ipv4").await?;
        let Some(ip) = addresses.split_whitespace().next() else {
            tracing::warn!("local IP from AWS metadata was empty");
            return Ok(None);
        };
        tracing::info!(ip, "using bind address from AWS metadata");
        return Ok(Some(ip.to_string()));
    }
    if value.starts_with('@') {
        return Err(MetadataLookupError {
            field: FIELD,
            value: value.to_string(),
            reason: "unknown metadata provider".to_string(),
        }
        .into());
    }
    value
        .parse::<IpAddr>()
        .map(|_| Some(value.to_string()))
        .map_err(|_| ConfigError::InvalidBindAddress(value.to_string()).into())
}

/// One field's lookup against the instance metadata of a specific provider.
struct MetadataLookup<'a> {
    field: &'static str,
    value: &'a str,
    cloud: &'a dyn CloudProvider,
}

impl<'a> MetadataLookup<'a> {
    fn new(
        field: &'static str,
        value: &'a str,
        provider: &str,
        cloud: Option<&'a dyn CloudProvider>,
    ) -> Result<Self, MetadataLookupError> {
        let fail = |reason: String| MetadataLookupError {
            field,
            value: value.to_string(),
            reason,
        };
        match cloud {
            Some(cloud) if cloud.name() == provider => Ok(Self { field, value, cloud }),
            Some(cloud) => Err(fail(format!(
                "node is running on {}, not {provider}",
                cloud.name()
            ))),
            None => Err(fail("no instance metadata source on this node".to_string())),
        }
    }

    async fn read(&self, path: &str) -> Result<String, MetadataLookupError> {
        let reason = match self.cloud.metadata(path).await {
            Ok(Some(v)) if !v.trim().is_empty() => return Ok(v.trim().to_string()),
            Ok(_) => format!("metadata {path} is empty"),
            Err(e) => format!("error reading metadata {path}: {e}"),
        };
        Err(MetadataLookupError {
            field: self.field,
            value: self.value.to_string(),
            reason,
        })
    }
}
