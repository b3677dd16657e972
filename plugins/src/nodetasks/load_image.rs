use std::path::PathBuf;

use async_trait::async_trait;

use nodeup_core::api::{Change, CheckOutcome, NodeTask, TaskContext, TaskError, TaskKey};

use super::{sha256_hex, shell_join, shell_quote};

/// A container image tarball, fetched from the first working mirror, verified
/// against its sha256 and loaded into the container runtime.
///
/// A marker file under the cache directory records that the image with this
/// hash has been loaded, so a second run does nothing.
#[derive(Debug, Clone)]
pub struct LoadImageTask {
    sources: Vec<String>,
    hash: String,
    runtime: String,
    cache_dir: PathBuf,
    deps: Vec<TaskKey>,
}

impl LoadImageTask {
    pub fn new(
        sources: Vec<String>,
        hash: impl Into<String>,
        runtime: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sources,
            hash: hash.into().to_ascii_lowercase(),
            runtime: runtime.into(),
            cache_dir: cache_dir.into(),
            deps: Vec::new(),
        }
    }

    pub fn after(mut self, deps: impl IntoIterator<Item = TaskKey>) -> Self {
        self.deps.extend(deps);
        self
    }

    fn tarball_path(&self) -> PathBuf {
        let name = self
            .sources
            .first()
            .and_then(|s| s.rsplit('/').next())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.tar", self.hash));
        self.cache_dir.join("images").join(name)
    }

    fn marker_path(&self) -> PathBuf {
        self.cache_dir
            .join("images")
            .join(format!("{}.loaded", self.hash))
    }

    fn load_command(&self) -> Result<Vec<String>, TaskError> {
        let tarball = self.tarball_path().display().to_string();
        match self.runtime.as_str() {
            "docker" => Ok(vec!["docker".into(), "load".into(), "-i".into(), tarball]),
            "containerd" => Ok(vec![
                "ctr".into(),
                "--namespace".into(),
                "k8s.io".into(),
                "images".into(),
                "import".into(),
                tarball,
            ]),
            other => Err(TaskError::fatal(format!(
                "cannot load images into unknown container runtime {other:?}"
            ))),
        }
    }

    /// Cached tarball with the right hash, or download from each source in
    /// turn until one verifies.
    async fn fetch(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let dest = self.tarball_path();
        if let Some(cached) = ctx.host.read_file(&dest).await? {
            if sha256_hex(&cached) == self.hash {
                tracing::debug!(path = %dest.display(), "image already in cache");
                return Ok(());
            }
        }

        let mut last_error = String::from("no sources configured");
        for url in &self.sources {
            if let Err(e) = ctx.host.download(url, &dest).await {
                tracing::warn!(url = %url, "error downloading image: {e}");
                last_error = e.to_string();
                continue;
            }
            let body = ctx.host.read_file(&dest).await?.unwrap_or_default();
            let actual = sha256_hex(&body);
            if actual == self.hash {
                return Ok(());
            }
            tracing::warn!(url = %url, expected = %self.hash, actual = %actual, "image hash mismatch");
            last_error = format!("hash mismatch for {url}: got {actual}");
        }
        Err(TaskError::transient(format!(
            "unable to fetch image {}: {last_error}",
            self.hash
        )))
    }
}

#[async_trait]
impl NodeTask for LoadImageTask {
    fn kind(&self) -> &'static str {
        "LoadImage"
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        self.deps.clone()
    }

    fn desired(&self) -> Vec<Change> {
        let source = self.sources.first().cloned().unwrap_or_default();
        vec![
            Change::create("source", source),
            Change::create("sha256", self.hash.clone()),
        ]
    }

    async fn check(&self, ctx: &TaskContext) -> Result<CheckOutcome, TaskError> {
        if ctx.host.stat(&self.marker_path()).await?.is_some() {
            return Ok(CheckOutcome::Satisfied);
        }
        Ok(CheckOutcome::Changes(self.desired()))
    }

    async fn apply(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let load = self.load_command()?;
        self.fetch(ctx).await?;
        ctx.host.run(&load).await?;
        ctx.host
            .write_file(&self.marker_path(), self.hash.as_bytes(), 0o644)
            .await?;
        tracing::info!(hash = %self.hash, runtime = %self.runtime, "image loaded");
        Ok(())
    }

    fn render_script(&self) -> Result<Vec<String>, TaskError> {
        let load = self.load_command()?;
        let tarball = shell_quote(&self.tarball_path().display().to_string());
        let marker = shell_quote(&self.marker_path().display().to_string());
        let images_dir = shell_quote(&self.cache_dir.join("images").display().to_string());

        let fetches: Vec<String> = self
            .sources
            .iter()
            .map(|url| format!("curl -fsSL --retry 5 -o {tarball} {}", shell_quote(url)))
            .collect();
        if fetches.is_empty() {
            return Err(TaskError::fatal(format!("image {} has no sources", self.hash)));
        }

        Ok(vec![
            format!("install -d -m 0755 {images_dir}"),
            format!("if [ ! -e {marker} ]; then"),
            format!("  {}", fetches.join(" || ")),
            format!("  echo '{}  '{tarball} | sha256sum -c -", self.hash),
            format!("  {}", shell_join(&load)),
            format!("  echo -n '{}' > {marker}", self.hash),
            "fi".to_string(),
        ])
    }
}
