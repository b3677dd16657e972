use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use nodeup_core::api::{CommandOutput, HostError, HostSystem, PathInfo};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// The machine nodeup is running on, optionally re-rooted at `--fs-root`.
///
/// With a root other than `/`, commands run through `chroot` so that package
/// managers and service managers act on the mounted image.
pub struct LocalHost {
    root: PathBuf,
    http: reqwest::Client,
}

impl LocalHost {
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .build()?;
        Ok(Self {
            root: root.into(),
            http,
        })
    }

    fn is_rerooted(&self) -> bool {
        self.root != Path::new("/")
    }

    fn command(&self, argv: &[String]) -> Result<Command, HostError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(HostError::CommandFailed {
                command: String::new(),
                status: "not started".to_string(),
                output: "empty command".to_string(),
            });
        };

        let mut cmd = if self.is_rerooted() {
            let mut cmd = Command::new("chroot");
            cmd.arg(&self.root).arg(program);
            cmd
        } else {
            Command::new(program)
        };
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }

    async fn exec(&self, argv: &[String]) -> Result<(CommandOutput, String), HostError> {
        let joined = argv.join(" ");
        let output = self
            .command(argv)?
            .output()
            .await
            .map_err(|e| HostError::CommandFailed {
                command: joined.clone(),
                status: "not started".to_string(),
                output: e.to_string(),
            })?;

        let result = CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        Ok((result, output.status.to_string()))
    }
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Remove a staged file left by a failed write.
async fn discard(staged: &Path) {
    match tokio::fs::remove_file(staged).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %staged.display(), "error removing staged file: {e}"),
    }
}

#[async_trait]
impl HostSystem for LocalHost {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>, HostError> {
        let real = self.resolve(path);
        match tokio::fs::read(&real).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HostError::io(&real, e)),
        }
    }

    async fn read_kernel_file(&self, path: &Path) -> Result<Option<Vec<u8>>, HostError> {
        match tokio::fs::read(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HostError::io(path, e)),
        }
    }

    async fn stat(&self, path: &Path) -> Result<Option<PathInfo>, HostError> {
        let real = self.resolve(path);
        match tokio::fs::metadata(&real).await {
            Ok(meta) => Ok(Some(PathInfo {
                is_dir: meta.is_dir(),
                mode: mode_of(&meta),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HostError::io(&real, e)),
        }
    }

    async fn query(&self, command: &[String]) -> Result<CommandOutput, HostError> {
        let (output, _) = self.exec(command).await?;
        Ok(output)
    }

    async fn write_file(&self, path: &Path, contents: &[u8], mode: u32) -> Result<(), HostError> {
        let real = self.resolve(path);
        if let Some(parent) = real.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HostError::io(parent, e))?;
        }
        // Write next to the target and rename, so readers never see a partial file.
        let staged = real.with_extension("nodeup-tmp");
        let written = async {
            tokio::fs::write(&staged, contents)
                .await
                .map_err(|e| HostError::io(&staged, e))?;
            set_mode(&staged, mode)
                .await
                .map_err(|e| HostError::io(&staged, e))?;
            tokio::fs::rename(&staged, &real)
                .await
                .map_err(|e| HostError::io(&real, e))
        }
        .await;
        if written.is_err() {
            discard(&staged).await;
        }
        written?;
        tracing::debug!(path = %path.display(), bytes = contents.len(), mode = format!("{mode:o}"), "wrote file");
        Ok(())
    }

    async fn create_dir(&self, path: &Path, mode: u32) -> Result<(), HostError> {
        let real = self.resolve(path);
        tokio::fs::create_dir_all(&real)
            .await
            .map_err(|e| HostError::io(&real, e))?;
        set_mode(&real, mode)
            .await
            .map_err(|e| HostError::io(&real, e))?;
        Ok(())
    }

    async fn run(&self, command: &[String]) -> Result<CommandOutput, HostError> {
        let joined = command.join(" ");
        tracing::info!(command = %joined, "running command");
        let (output, status) = self.exec(command).await?;
        if !output.success {
            let mut combined = output.stdout.clone();
            combined.push_str(&output.stderr);
            return Err(HostError::CommandFailed {
                command: joined,
                status,
                output: combined,
            });
        }
        Ok(output)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<(), HostError> {
        let real = self.resolve(dest);
        let download_err = |message: String| HostError::Download {
            url: url.to_string(),
            message,
        };

        if let Some(parent) = real.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HostError::io(parent, e))?;
        }

        tracing::info!(url = %url, dest = %real.display(), "downloading");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(download_err(format!("unexpected status {status}")));
        }

        let staged = real.with_extension("download");
        let fetched = async {
            let mut file = tokio::fs::File::create(&staged)
                .await
                .map_err(|e| HostError::io(&staged, e))?;
            let mut body = resp.bytes_stream();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| download_err(e.to_string()))?;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| HostError::io(&staged, e))?;
            }
            file.flush().await.map_err(|e| HostError::io(&staged, e))?;
            drop(file);

            tokio::fs::rename(&staged, &real)
                .await
                .map_err(|e| HostError::io(&real, e))
        }
        .await;
        if fetched.is_err() {
            discard(&staged).await;
        }
        fetched
    }
}
