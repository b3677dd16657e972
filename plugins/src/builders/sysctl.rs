use std::sync::Arc;

use async_trait::async_trait;

use nodeup_core::api::{argv, Builder, Fragment, ModelContext};

use super::KernelModulesBuilder;
use crate::nodetasks::FileTask;

pub const SYSCTL_PATH: &str = "/etc/sysctl.d/99-k8s-general.conf";

const DEFAULTS: &[&str] = &[
    "# Kubernetes Settings",
    "",
    "# Increase the number of connections",
    "net.core.somaxconn = 32768",
    "",
    "# Maximum Socket Receive Buffer",
    "net.core.rmem_max = 16777216",
    "",
    "# Default Socket Send Buffer",
    "net.core.wmem_max = 16777216",
    "",
    "# Increase the maximum total buffer-space allocatable",
    "net.ipv4.tcp_wmem = 4096 12582912 16777216",
    "net.ipv4.tcp_rmem = 4096 12582912 16777216",
    "",
    "# Increase the number of outstanding syn requests allowed",
    "net.ipv4.tcp_max_syn_backlog = 8096",
    "",
    "# For persistent HTTP connections",
    "net.ipv4.tcp_slow_start_after_idle = 0",
    "",
    "# Allow to reuse TIME_WAIT sockets for new connections",
    "net.ipv4.tcp_tw_reuse = 1",
    "",
    "# Max number of packets that can be queued on interface input",
    "net.core.netdev_max_backlog = 16384",
    "",
    "# Increase size of file handles and inode cache",
    "fs.file-max = 2097152",
    "",
    "# Max number of inotify instances and watches for a user",
    "fs.inotify.max_user_instances = 8192",
    "fs.inotify.max_user_watches = 524288",
    "",
    "# Additional sysctl flags that kubelet expects",
    "vm.overcommit_memory = 1",
    "kernel.panic = 10",
    "kernel.panic_on_oops = 1",
    "",
    "# Pods and services need to be routable",
    "net.ipv4.ip_forward = 1",
    "net.bridge.bridge-nf-call-iptables = 1",
    "",
];

/// Kernel parameters: defaults, then the cluster's, then the instance group's.
/// Later lines win when sysctl applies the file.
pub struct SysctlBuilder {
    ctx: Arc<ModelContext>,
}

impl SysctlBuilder {
    pub fn new(ctx: Arc<ModelContext>) -> Self {
        Self { ctx }
    }

    fn render(&self) -> String {
        let mut lines: Vec<String> = DEFAULTS.iter().map(|s| s.to_string()).collect();

        if !self.ctx.cluster.sysctl_parameters.is_empty() {
            lines.push("# Custom sysctl parameters from cluster spec".to_string());
            lines.extend(self.ctx.cluster.sysctl_parameters.iter().cloned());
            lines.push(String::new());
        }

        if let Some(ig) = &self.ctx.instance_group {
            if !ig.sysctl_parameters.is_empty() {
                lines.push(format!(
                    "# Custom sysctl parameters from instance group {}",
                    ig.name
                ));
                lines.extend(ig.sysctl_parameters.iter().cloned());
                lines.push(String::new());
            }
        }

        lines.join("\n")
    }
}

#[async_trait]
impl Builder for SysctlBuilder {
    fn name(&self) -> &str {
        "sysctl"
    }

    async fn build(&self) -> anyhow::Result<Fragment> {
        // bridge-nf-call-iptables only exists once br_netfilter is loaded.
        let task = FileTask::file(SYSCTL_PATH, self.render(), 0o644)
            .after([KernelModulesBuilder::key()])
            .on_change(argv(&["sysctl", "--system"]));

        let mut fragment = Fragment::new();
        fragment.add(task.key(), task);
        Ok(fragment)
    }
}
