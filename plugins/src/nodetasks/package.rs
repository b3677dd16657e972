use async_trait::async_trait;

use nodeup_core::api::{
    Change, CheckOutcome, DistributionFamily, NodeTask, TaskContext, TaskError, TaskKey,
};

use super::shell_join;

/// An OS package, installed through the distribution's package manager.
#[derive(Debug, Clone)]
pub struct PackageTask {
    name: String,
    version: Option<String>,
    family: DistributionFamily,
    deps: Vec<TaskKey>,
}

impl PackageTask {
    pub fn new(name: impl Into<String>, family: DistributionFamily) -> Self {
        Self {
            name: name.into(),
            version: None,
            family,
            deps: Vec::new(),
        }
    }

    pub fn version(mut self, version: Option<String>) -> Self {
        self.version = version.filter(|v| !v.is_empty());
        self
    }

    pub fn after(mut self, deps: impl IntoIterator<Item = TaskKey>) -> Self {
        self.deps.extend(deps);
        self
    }

    pub fn key_for(name: &str) -> TaskKey {
        TaskKey::new(format!("package:{name}"))
    }

    pub fn key(&self) -> TaskKey {
        Self::key_for(&self.name)
    }

    fn query_command(&self) -> Result<Vec<String>, TaskError> {
        match self.family {
            DistributionFamily::Debian => Ok(vec![
                "dpkg-query".into(),
                "-W".into(),
                "-f=${Version}".into(),
                self.name.clone(),
            ]),
            DistributionFamily::Rhel => Ok(vec![
                "rpm".into(),
                "-q".into(),
                "--queryformat".into(),
                "%{VERSION}".into(),
                self.name.clone(),
            ]),
            DistributionFamily::Other => Err(self.unsupported()),
        }
    }

    fn install_command(&self) -> Result<Vec<String>, TaskError> {
        match self.family {
            DistributionFamily::Debian => {
                let target = match &self.version {
                    Some(v) => format!("{}={}", self.name, v),
                    None => self.name.clone(),
                };
                Ok(vec![
                    "env".into(),
                    "DEBIAN_FRONTEND=noninteractive".into(),
                    "apt-get".into(),
                    "install".into(),
                    "--yes".into(),
                    "--no-install-recommends".into(),
                    target,
                ])
            }
            DistributionFamily::Rhel => {
                let target = match &self.version {
                    Some(v) => format!("{}-{}", self.name, v),
                    None => self.name.clone(),
                };
                Ok(vec!["yum".into(), "install".into(), "-y".into(), target])
            }
            DistributionFamily::Other => Err(self.unsupported()),
        }
    }

    fn unsupported(&self) -> TaskError {
        TaskError::fatal(format!(
            "cannot install package {}: no known package manager for this distribution",
            self.name
        ))
    }

    fn desired_value(&self) -> String {
        self.version.clone().unwrap_or_else(|| "installed".to_string())
    }

    fn satisfies(&self, installed: &str) -> bool {
        match &self.version {
            None => true,
            Some(want) => installed == want || upstream_version(installed) == upstream_version(want),
        }
    }
}

/// Upstream part of a package version: `5:20.10.17~3-0~ubuntu-focal` is `20.10.17`.
fn upstream_version(version: &str) -> &str {
    let version = version.split_once(':').map_or(version, |(_, rest)| rest);
    let version = version.rsplit_once('-').map_or(version, |(upstream, _)| upstream);
    version.split('~').next().unwrap_or(version)
}

#[async_trait]
impl NodeTask for PackageTask {
    fn kind(&self) -> &'static str {
        "Package"
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        self.deps.clone()
    }

    fn desired(&self) -> Vec<Change> {
        vec![Change::create(self.name.clone(), self.desired_value())]
    }

    async fn check(&self, ctx: &TaskContext) -> Result<CheckOutcome, TaskError> {
        let output = ctx.host.query(&self.query_command()?).await?;
        let installed = output.stdout.trim();
        if output.success && !installed.is_empty() {
            if self.satisfies(installed) {
                return Ok(CheckOutcome::Satisfied);
            }
            return Ok(CheckOutcome::Changes(vec![Change::new(
                self.name.clone(),
                Some(installed.to_string()),
                self.desired_value(),
            )]));
        }
        Ok(CheckOutcome::Changes(self.desired()))
    }

    async fn apply(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        ctx.host.run(&self.install_command()?).await?;
        Ok(())
    }

    fn render_script(&self) -> Result<Vec<String>, TaskError> {
        Ok(vec![shell_join(&self.install_command()?)])
    }

    fn script_preamble(&self) -> Vec<String> {
        match self.family {
            DistributionFamily::Debian => vec!["apt-get update".to_string()],
            _ => Vec::new(),
        }
    }
}
