use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use nodeup_core::api::{Builder, FileAssetSpec, Fragment, ModelContext};

use crate::nodetasks::FileTask;

const DEFAULT_ASSET_DIR: &str = "/srv/kubernetes/assets";

/// Arbitrary files declared in the cluster spec and the instance group.
pub struct FileAssetsBuilder {
    ctx: Arc<ModelContext>,
}

impl FileAssetsBuilder {
    pub fn new(ctx: Arc<ModelContext>) -> Self {
        Self { ctx }
    }

    fn applies(&self, asset: &FileAssetSpec) -> bool {
        asset.roles.is_empty() || asset.roles.contains(&self.ctx.role())
    }

    fn task(asset: &FileAssetSpec) -> anyhow::Result<FileTask> {
        if asset.name.is_empty() {
            anyhow::bail!("file asset without a name");
        }
        let path = if asset.path.is_empty() {
            PathBuf::from(DEFAULT_ASSET_DIR).join(&asset.name)
        } else {
            PathBuf::from(&asset.path)
        };
        if !path.is_absolute() {
            anyhow::bail!("file asset {} has relative path {}", asset.name, path.display());
        }
        Ok(FileTask::file(path, asset.content.as_bytes(), 0o440))
    }
}

#[async_trait]
impl Builder for FileAssetsBuilder {
    fn name(&self) -> &str {
        "file-assets"
    }

    async fn build(&self) -> anyhow::Result<Fragment> {
        let ig_assets = self
            .ctx
            .instance_group
            .as_ref()
            .map(|ig| ig.file_assets.as_slice())
            .unwrap_or_default();

        let mut fragment = Fragment::new();
        for asset in self.ctx.cluster.file_assets.iter().chain(ig_assets) {
            if !self.applies(asset) {
                tracing::debug!(asset = %asset.name, "file asset does not apply to this role");
                continue;
            }
            let task = Self::task(asset)?;
            fragment.add(task.key(), task);
        }
        Ok(fragment)
    }
}
