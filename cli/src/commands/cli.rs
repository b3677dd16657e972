use std::path::PathBuf;

use clap::Parser;

/// Converge this machine to its declared node configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "nodeup", version)]
pub struct Args {
    /// Node configuration document (local path or file://).
    #[arg(long = "conf")]
    pub conf: Option<String>,

    /// Directory downloaded assets and images are cached in.
    #[arg(long, default_value = "/var/cache/kubernetes-install")]
    pub cache_dir: PathBuf,

    /// Root of the filesystem to converge. Anything other than `/` runs
    /// commands through chroot.
    #[arg(long, default_value = "/")]
    pub fs_root: PathBuf,

    /// direct, dryrun or cloudinit. Defaults to the agent config's `target`.
    #[arg(long)]
    pub target: Option<String>,

    /// Where dryrun reports and cloudinit scripts are written (stdout if unset).
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Agent configuration (TOML).
    #[arg(long)]
    pub app_config: Option<String>,
}
