//! Access to the machine being converged.
//!
//! Reads and mutations are separate methods so that "did this run change
//! anything" is answerable from the host side: `run`, `write_file`,
//! `create_dir` and `download` mutate; everything else only observes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::HostError;

/// Output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Metadata of a path on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathInfo {
    pub is_dir: bool,
    pub mode: u32,
}

#[async_trait]
pub trait HostSystem: Send + Sync {
    /// Filesystem root all absolute task paths are resolved under.
    fn root(&self) -> &Path;

    /// `path` re-rooted under [`HostSystem::root`].
    fn resolve(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix("/").unwrap_or(path);
        self.root().join(relative)
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>, HostError>;

    /// Read a file the running kernel exposes (`/proc`, `/sys`). Never
    /// re-rooted: the kernel is the live one even when tasks target an image.
    async fn read_kernel_file(&self, path: &Path) -> Result<Option<Vec<u8>>, HostError>;

    async fn stat(&self, path: &Path) -> Result<Option<PathInfo>, HostError>;

    /// Run a read-only command (package queries, `systemctl is-active`, ...).
    async fn query(&self, command: &[String]) -> Result<CommandOutput, HostError>;

    async fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> Result<(), HostError>;

    async fn create_dir(&self, path: &Path, mode: u32) -> Result<(), HostError>;

    /// Run a command that changes host state. A non-zero exit is an error.
    async fn run(&self, command: &[String]) -> Result<CommandOutput, HostError>;

    /// Fetch `url` into `dest`.
    async fn download(&self, url: &str, dest: &Path) -> Result<(), HostError>;
}

/// Build an owned argv from string slices.
pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryHost;

    #[test]
    fn resolve_reroots_absolute_paths() {
        let host = MemoryHost::with_root("/mnt/image");
        assert_eq!(
            host.resolve(Path::new("/etc/sysctl.d/99-k8s-general.conf")),
            PathBuf::from("/mnt/image/etc/sysctl.d/99-k8s-general.conf")
        );
    }
}
