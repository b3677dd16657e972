use std::path::PathBuf;

use async_trait::async_trait;

use nodeup_core::api::{Change, CheckOutcome, NodeTask, TaskContext, TaskError, TaskKey};

use super::{sha256_hex, shell_quote};

/// A declared asset downloaded into the node's asset cache, verified against
/// its sha256 when one is pinned.
#[derive(Debug, Clone)]
pub struct FetchAssetTask {
    url: String,
    hash: Option<String>,
    dest: PathBuf,
    deps: Vec<TaskKey>,
}

impl FetchAssetTask {
    pub fn new(url: impl Into<String>, hash: Option<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            hash: hash.map(|h| h.to_ascii_lowercase()),
            dest: dest.into(),
            deps: Vec::new(),
        }
    }

    pub fn after(mut self, deps: impl IntoIterator<Item = TaskKey>) -> Self {
        self.deps.extend(deps);
        self
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(format!("asset:{}", self.dest.display()))
    }

    fn verifies(&self, contents: &[u8]) -> bool {
        self.hash
            .as_deref()
            .map_or(true, |want| sha256_hex(contents) == want)
    }
}

#[async_trait]
impl NodeTask for FetchAssetTask {
    fn kind(&self) -> &'static str {
        "Asset"
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        self.deps.clone()
    }

    fn desired(&self) -> Vec<Change> {
        vec![Change::create(self.dest.display().to_string(), self.url.clone())]
    }

    async fn check(&self, ctx: &TaskContext) -> Result<CheckOutcome, TaskError> {
        match ctx.host.read_file(&self.dest).await? {
            Some(cached) if self.verifies(&cached) => Ok(CheckOutcome::Satisfied),
            Some(cached) => Ok(CheckOutcome::Changes(vec![Change::new(
                self.dest.display().to_string(),
                Some(format!("sha256:{}", sha256_hex(&cached))),
                self.url.clone(),
            )])),
            None => Ok(CheckOutcome::Changes(self.desired())),
        }
    }

    async fn apply(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        ctx.host.download(&self.url, &self.dest).await?;
        let body = ctx.host.read_file(&self.dest).await?.unwrap_or_default();
        if !self.verifies(&body) {
            return Err(TaskError::transient(format!(
                "hash mismatch for {}: got {}",
                self.url,
                sha256_hex(&body)
            )));
        }
        tracing::info!(url = %self.url, dest = %self.dest.display(), "asset cached");
        Ok(())
    }

    fn render_script(&self) -> Result<Vec<String>, TaskError> {
        let dest = shell_quote(&self.dest.display().to_string());
        let parent = self
            .dest
            .parent()
            .map(|p| shell_quote(&p.display().to_string()))
            .unwrap_or_else(|| "/".to_string());

        let mut lines = vec![
            format!("install -d -m 0755 {parent}"),
            format!("curl -fsSL --retry 5 -o {dest} {}", shell_quote(&self.url)),
        ];
        if let Some(hash) = &self.hash {
            lines.push(format!("echo '{hash}  '{dest} | sha256sum -c -"));
        }
        Ok(lines)
    }
}
