use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine as _;

use nodeup_core::api::{Change, CheckOutcome, NodeTask, TaskContext, TaskError, TaskKey};

use super::{fingerprint, format_mode, shell_join, shell_quote};

#[derive(Debug, Clone, PartialEq, Eq)]
enum FileKind {
    File(Vec<u8>),
    Directory,
}

/// A file or directory with fixed contents and mode.
#[derive(Debug, Clone)]
pub struct FileTask {
    path: PathBuf,
    kind: FileKind,
    mode: u32,
    deps: Vec<TaskKey>,
    on_change: Option<Vec<String>>,
}

impl FileTask {
    pub fn file(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>, mode: u32) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::File(contents.into()),
            mode,
            deps: Vec::new(),
            on_change: None,
        }
    }

    pub fn directory(path: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::Directory,
            mode,
            deps: Vec::new(),
            on_change: None,
        }
    }

    pub fn key_for(path: impl AsRef<Path>) -> TaskKey {
        TaskKey::new(format!("file:{}", path.as_ref().display()))
    }

    pub fn key(&self) -> TaskKey {
        Self::key_for(&self.path)
    }

    pub fn after(mut self, deps: impl IntoIterator<Item = TaskKey>) -> Self {
        self.deps.extend(deps);
        self
    }

    /// Command to run after the file has been (re)written.
    pub fn on_change(mut self, command: Vec<String>) -> Self {
        self.on_change = Some(command);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn desired_value(&self) -> String {
        match &self.kind {
            FileKind::File(contents) => fingerprint(contents),
            FileKind::Directory => "directory".to_string(),
        }
    }
}

#[async_trait]
impl NodeTask for FileTask {
    fn kind(&self) -> &'static str {
        match self.kind {
            FileKind::File(_) => "File",
            FileKind::Directory => "Directory",
        }
    }

    fn dependencies(&self) -> Vec<TaskKey> {
        self.deps.clone()
    }

    fn desired(&self) -> Vec<Change> {
        let path = self.path.display().to_string();
        vec![
            Change::create(path, self.desired_value()),
            Change::create("mode", format_mode(self.mode)),
        ]
    }

    async fn check(&self, ctx: &TaskContext) -> Result<CheckOutcome, TaskError> {
        let path = self.path.display().to_string();
        let Some(info) = ctx.host.stat(&self.path).await? else {
            return Ok(CheckOutcome::Changes(self.desired()));
        };

        let mut changes = Vec::new();
        match &self.kind {
            FileKind::Directory if !info.is_dir => {
                return Err(TaskError::fatal(format!(
                    "{path} exists but is not a directory"
                )));
            }
            FileKind::Directory => {}
            FileKind::File(_) if info.is_dir => {
                return Err(TaskError::fatal(format!("{path} exists but is a directory")));
            }
            FileKind::File(contents) => {
                let current = ctx.host.read_file(&self.path).await?.unwrap_or_default();
                if &current != contents {
                    changes.push(Change::new(
                        path,
                        Some(fingerprint(&current)),
                        fingerprint(contents),
                    ));
                }
            }
        }
        if info.mode != self.mode {
            changes.push(Change::new(
                "mode",
                Some(format_mode(info.mode)),
                format_mode(self.mode),
            ));
        }
        Ok(CheckOutcome::from_changes(changes))
    }

    async fn apply(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        match &self.kind {
            FileKind::Directory => ctx.host.create_dir(&self.path, self.mode).await?,
            FileKind::File(contents) => {
                ctx.host.write_file(&self.path, contents, self.mode).await?
            }
        }
        if let Some(command) = &self.on_change {
            ctx.host.run(command).await?;
        }
        Ok(())
    }

    fn render_script(&self) -> Result<Vec<String>, TaskError> {
        let path = shell_quote(&self.path.display().to_string());
        let mode = format_mode(self.mode);
        let mut lines = match &self.kind {
            FileKind::Directory => vec![format!("install -d -m {mode} {path}")],
            FileKind::File(contents) => {
                let parent = self
                    .path
                    .parent()
                    .map(|p| shell_quote(&p.display().to_string()))
                    .unwrap_or_else(|| "/".to_string());
                let encoded = base64::engine::general_purpose::STANDARD.encode(contents);
                vec![
                    format!("install -d -m 0755 {parent}"),
                    format!("echo '{encoded}' | base64 -d > {path}"),
                    format!("chmod {mode} {path}"),
                ]
            }
        };
        if let Some(command) = &self.on_change {
            lines.push(shell_join(command));
        }
        Ok(lines)
    }
}
