use std::sync::Arc;

use async_trait::async_trait;

use nodeup_core::api::{Builder, DistributionFamily, Fragment, ModelContext};

use crate::nodetasks::PackageTask;

/// Utility packages kubelet and kube-proxy shell out to.
pub struct MiscUtilsBuilder {
    ctx: Arc<ModelContext>,
}

impl MiscUtilsBuilder {
    pub fn new(ctx: Arc<ModelContext>) -> Self {
        Self { ctx }
    }

    fn packages(family: DistributionFamily) -> &'static [&'static str] {
        match family {
            DistributionFamily::Debian => &[
                "socat", "curl", "wget", "nfs-common", "python-apt", "apt-transport-https",
                "conntrack", "ebtables", "ethtool",
            ],
            DistributionFamily::Rhel => &[
                "socat", "curl", "wget", "nfs-utils", "python2", "git", "conntrack-tools",
                "ebtables", "ethtool",
            ],
            DistributionFamily::Other => &[],
        }
    }
}

#[async_trait]
impl Builder for MiscUtilsBuilder {
    fn name(&self) -> &str {
        "misc-utils"
    }

    async fn build(&self) -> anyhow::Result<Fragment> {
        let family = self.ctx.distribution.family();
        let mut fragment = Fragment::new();
        let packages = Self::packages(family);
        if packages.is_empty() {
            tracing::debug!(distribution = ?self.ctx.distribution, "skipping utility packages");
        }
        for name in packages {
            let task = PackageTask::new(*name, family);
            fragment.add(task.key(), task);
        }
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::fixtures::model;
    use nodeup_core::api::{ClusterSpec, Distribution};

    #[tokio::test]
    async fn packages_follow_distribution_family() {
        let centos = MiscUtilsBuilder::new(model(Distribution::Centos, ClusterSpec::default(), None))
            .build()
            .await
            .unwrap();
        assert!(centos.keys().any(|k| k.as_str() == "package:conntrack-tools"));

        let flatcar = MiscUtilsBuilder::new(model(Distribution::Flatcar, ClusterSpec::default(), None))
            .build()
            .await
            .unwrap();
        assert!(flatcar.is_empty());
    }
}
