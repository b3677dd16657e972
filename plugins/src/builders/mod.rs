//! Builders turn the node model into task fragments.
//!
//! Each builder reads the shared [`ModelContext`] and contributes tasks keyed
//! by what they manage (`file:<path>`, `package:<name>`, `service:<unit>`).
//! Ordering across builders is expressed only through those keys.

mod assets;
mod directory;
mod docker;
mod file_assets;
mod kernel_modules;
mod misc_utils;
mod pki;
mod sysctl;

pub use assets::AssetsBuilder;
pub use directory::DirectoryBuilder;
pub use docker::{DockerBuilder, DOCKER_SERVICE};
pub use file_assets::FileAssetsBuilder;
pub use kernel_modules::KernelModulesBuilder;
pub use misc_utils::MiscUtilsBuilder;
pub use pki::PkiBuilder;
pub use sysctl::SysctlBuilder;

use std::sync::Arc;

use nodeup_core::api::{Builder, ModelContext};

/// Every builder, in registration order.
pub fn all(ctx: &Arc<ModelContext>) -> Vec<Arc<dyn Builder>> {
    vec![
        Arc::new(MiscUtilsBuilder::new(ctx.clone())),
        Arc::new(DirectoryBuilder::new(ctx.clone())),
        Arc::new(AssetsBuilder::new(ctx.clone())),
        Arc::new(PkiBuilder::new(ctx.clone())),
        Arc::new(DockerBuilder::new(ctx.clone())),
        Arc::new(FileAssetsBuilder::new(ctx.clone())),
        Arc::new(KernelModulesBuilder::new(ctx.clone())),
        Arc::new(SysctlBuilder::new(ctx.clone())),
    ]
}
