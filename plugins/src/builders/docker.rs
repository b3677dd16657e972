use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use nodeup_core::api::{Builder, DistributionFamily, DockerConfig, Fragment, ModelContext};

use crate::nodetasks::{FileTask, PackageTask, ServiceTask};

pub const DOCKER_PACKAGE: &str = "docker-ce";
pub const DOCKER_SERVICE: &str = "docker.service";
pub const DAEMON_JSON: &str = "/etc/docker/daemon.json";

/// Docker package, daemon configuration and service. Contributes nothing
/// when the cluster runs another container runtime.
pub struct DockerBuilder {
    ctx: Arc<ModelContext>,
}

impl DockerBuilder {
    pub fn new(ctx: Arc<ModelContext>) -> Self {
        Self { ctx }
    }

    fn daemon_json(config: &DockerConfig) -> anyhow::Result<String> {
        let mut doc = Map::new();
        if let Some(storage) = config.storage.as_deref().filter(|s| !s.is_empty()) {
            doc.insert("storage-driver".into(), Value::from(storage));
        }
        if let Some(driver) = config.log_driver.as_deref().filter(|s| !s.is_empty()) {
            doc.insert("log-driver".into(), Value::from(driver));
        }
        if !config.log_opt.is_empty() {
            let mut opts = Map::new();
            for opt in &config.log_opt {
                let Some((k, v)) = opt.split_once('=') else {
                    anyhow::bail!("invalid docker log option {opt:?}, expected key=value");
                };
                opts.insert(k.trim().to_string(), Value::from(v.trim()));
            }
            doc.insert("log-opts".into(), Value::Object(opts));
        }
        if !config.insecure_registries.is_empty() {
            doc.insert(
                "insecure-registries".into(),
                Value::from(config.insecure_registries.clone()),
            );
        }
        if !config.registry_mirrors.is_empty() {
            doc.insert(
                "registry-mirrors".into(),
                Value::from(config.registry_mirrors.clone()),
            );
        }

        let mut rendered = serde_json::to_string_pretty(&Value::Object(doc))?;
        rendered.push('\n');
        Ok(rendered)
    }
}

#[async_trait]
impl Builder for DockerBuilder {
    fn name(&self) -> &str {
        "docker"
    }

    async fn build(&self) -> anyhow::Result<Fragment> {
        let mut fragment = Fragment::new();
        if !self.ctx.uses_docker() {
            tracing::debug!(
                runtime = %self.ctx.cluster.container_runtime,
                "skipping docker"
            );
            return Ok(fragment);
        }

        let config = self.ctx.cluster.docker.clone().unwrap_or_default();
        let family = self.ctx.distribution.family();

        // Images such as Flatcar ship docker; only configure it there.
        let mut service_deps = Vec::new();
        let mut config_deps = Vec::new();
        if family != DistributionFamily::Other {
            let package = PackageTask::new(DOCKER_PACKAGE, family).version(config.version.clone());
            service_deps.push(package.key());
            config_deps.push(package.key());
            fragment.add(package.key(), package);
        }

        let daemon = FileTask::file(DAEMON_JSON, Self::daemon_json(&config)?, 0o644).after(config_deps);
        service_deps.push(daemon.key());
        fragment.add(daemon.key(), daemon);

        let service = ServiceTask::new(DOCKER_SERVICE).after(service_deps);
        fragment.add(service.key(), service);
        Ok(fragment)
    }
}
