use std::sync::Arc;

use async_trait::async_trait;

use nodeup_core::api::{argv, Builder, Fragment, ModelContext, TaskKey};

use crate::nodetasks::FileTask;

pub const MODULES_LOAD_PATH: &str = "/etc/modules-load.d/k8s.conf";

/// Kernel modules loaded at every boot.
pub const BOOT_MODULES: &[&str] = &["br_netfilter", "overlay"];

pub struct KernelModulesBuilder {
    ctx: Arc<ModelContext>,
}

impl KernelModulesBuilder {
    pub fn new(ctx: Arc<ModelContext>) -> Self {
        Self { ctx }
    }

    pub fn key() -> TaskKey {
        FileTask::key_for(MODULES_LOAD_PATH)
    }
}

#[async_trait]
impl Builder for KernelModulesBuilder {
    fn name(&self) -> &str {
        "kernel-modules"
    }

    async fn build(&self) -> anyhow::Result<Fragment> {
        let mut contents = BOOT_MODULES.join("\n");
        contents.push('\n');

        let mut task = FileTask::file(MODULES_LOAD_PATH, contents, 0o644);
        if self.ctx.has_tag("_systemd") {
            task = task.on_change(argv(&[
                "systemctl",
                "restart",
                "systemd-modules-load.service",
            ]));
        }
        let mut fragment = Fragment::new();
        fragment.add(task.key(), task);
        Ok(fragment)
    }
}
