use std::sync::Arc;

use async_trait::async_trait;

use nodeup_core::api::{Builder, Fragment, ModelContext};

use crate::nodetasks::{FetchAssetTask, FileTask};

/// Downloads every asset declared for this node's architecture into the
/// asset cache.
pub struct AssetsBuilder {
    ctx: Arc<ModelContext>,
}

impl AssetsBuilder {
    pub fn new(ctx: Arc<ModelContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Builder for AssetsBuilder {
    fn name(&self) -> &str {
        "assets"
    }

    async fn build(&self) -> anyhow::Result<Fragment> {
        let store = &self.ctx.assets;
        let cache_dir = FileTask::key_for(store.cache_dir());

        let mut fragment = Fragment::new();
        for asset in store.assets() {
            let task = FetchAssetTask::new(&asset.url, asset.hash.clone(), store.cache_path(asset))
                .after([cache_dir.clone()]);
            fragment.add(task.key(), task);
        }
        Ok(fragment)
    }
}
