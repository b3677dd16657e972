use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use nodeup_core::api::{argv, CapabilityProbe, HostSystem, ProbeError};

const PROC_FILESYSTEMS: &str = "/proc/filesystems";
const PROC_MODULES: &str = "/proc/modules";
const MODPROBE: &str = "/sbin/modprobe";

/// Filesystems the running kernel supports, enabled by loading the module of
/// the same name.
pub struct KernelFilesystems {
    host: Arc<dyn HostSystem>,
    allow_enable: bool,
}

impl KernelFilesystems {
    pub fn new(host: Arc<dyn HostSystem>) -> Self {
        Self {
            host,
            allow_enable: true,
        }
    }

    /// Probe only; `enable` always fails. For runs that must not touch the host.
    pub fn read_only(host: Arc<dyn HostSystem>) -> Self {
        Self {
            host,
            allow_enable: false,
        }
    }
}

/// Last column of each `/proc/filesystems` line (`nodev\tsysfs`, `\text4`).
fn parse_filesystems(contents: &str) -> impl Iterator<Item = &str> {
    contents
        .lines()
        .filter_map(|line| line.split_whitespace().last())
}

#[async_trait]
impl CapabilityProbe for KernelFilesystems {
    async fn is_supported(&self, facility: &str) -> Result<bool, ProbeError> {
        let contents = self
            .host
            .read_kernel_file(Path::new(PROC_FILESYSTEMS))
            .await
            .map_err(|e| ProbeError::Probe {
                facility: facility.to_string(),
                message: e.to_string(),
            })?
            .ok_or_else(|| ProbeError::Probe {
                facility: facility.to_string(),
                message: format!("{PROC_FILESYSTEMS} not found"),
            })?;
        let contents = String::from_utf8_lossy(&contents);
        let found = parse_filesystems(&contents).any(|fs| fs == facility);
        Ok(found)
    }

    async fn enable(&self, facility: &str) -> Result<(), ProbeError> {
        if !self.allow_enable {
            return Err(ProbeError::Enable {
                facility: facility.to_string(),
                message: "module loading disabled for this run".to_string(),
            });
        }
        tracing::info!(module = facility, "loading kernel module");
        self.host
            .run(&argv(&[MODPROBE, facility]))
            .await
            .map(|_| ())
            .map_err(|e| ProbeError::Enable {
                facility: facility.to_string(),
                message: e.to_string(),
            })
    }
}

/// Make sure `module` is loaded. Failure is logged, never returned: later
/// tasks that need the module will fail on their own and be retried.
pub async fn ensure_kernel_module(host: &dyn HostSystem, module: &str) -> bool {
    match host.read_kernel_file(Path::new(PROC_MODULES)).await {
        Ok(Some(contents)) => {
            let contents = String::from_utf8_lossy(&contents);
            let loaded = contents
                .lines()
                .filter_map(|l| l.split_whitespace().next())
                .any(|name| name == module);
            if loaded {
                tracing::debug!(module, "kernel module already loaded");
                return true;
            }
        }
        Ok(None) => {}
        Err(e) => tracing::debug!(module, "cannot read {PROC_MODULES}: {e}"),
    }

    match host.run(&argv(&[MODPROBE, module])).await {
        Ok(_) => {
            tracing::info!(module, "loaded kernel module");
            true
        }
        Err(e) => {
            tracing::warn!(module, "error loading kernel module: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeup_core::api::{CommandOutput, Negotiator};
    use nodeup_core::testing::MemoryHost;

    const FILESYSTEMS: &str = "nodev\tsysfs\nnodev\tproc\n\text4\nnodev\toverlay\n";

    #[tokio::test]
    async fn reads_proc_filesystems() {
        let host = Arc::new(MemoryHost::default().with_kernel_file(PROC_FILESYSTEMS, FILESYSTEMS));
        let probe = KernelFilesystems::new(host);
        assert!(probe.is_supported("overlay").await.unwrap());
        assert!(probe.is_supported("ext4").await.unwrap());
        assert!(!probe.is_supported("aufs").await.unwrap());
    }

    #[tokio::test]
    async fn image_root_does_not_hide_the_live_kernel() {
        // A /proc/filesystems inside the mounted image is not the kernel's.
        let host = Arc::new(
            MemoryHost::with_root("/mnt/image")
                .with_file(PROC_FILESYSTEMS, "nodev\tsysfs\n", 0o444)
                .with_kernel_file(PROC_FILESYSTEMS, FILESYSTEMS),
        );
        let probe = KernelFilesystems::read_only(host);
        assert!(probe.is_supported("ext4").await.unwrap());
    }

    #[tokio::test]
    async fn missing_proc_is_a_probe_error() {
        let probe = KernelFilesystems::new(Arc::new(MemoryHost::default()));
        assert!(matches!(
            probe.is_supported("overlay").await,
            Err(ProbeError::Probe { .. })
        ));
    }

    #[tokio::test]
    async fn overlay2_selected_without_loading_modules() {
        let host = Arc::new(MemoryHost::default().with_kernel_file(PROC_FILESYSTEMS, FILESYSTEMS));
        let probe = KernelFilesystems::new(host.clone());
        let decision = Negotiator::new("docker storage", &probe)
            .with_alias("overlay2", "overlay")
            .negotiate(&["overlay2", "aufs"])
            .await
            .unwrap();
        assert_eq!(decision.chosen, "overlay2");
        assert!(host.commands().is_empty());
    }

    #[tokio::test]
    async fn failing_modprobe_still_yields_a_choice() {
        let host = Arc::new(
            MemoryHost::default()
                .with_kernel_file(PROC_FILESYSTEMS, FILESYSTEMS)
                .fail_run("/sbin/modprobe zfs", "modprobe: FATAL: Module zfs not found"),
        );
        let probe = KernelFilesystems::new(host.clone());
        let decision = Negotiator::new("docker storage", &probe)
            .negotiate(&["zfs"])
            .await
            .unwrap();
        assert_eq!(decision.chosen, "zfs");
        assert!(!decision.supported);
        assert_eq!(host.commands(), vec!["/sbin/modprobe zfs".to_string()]);
    }

    #[tokio::test]
    async fn read_only_probe_never_runs_modprobe() {
        let host = Arc::new(MemoryHost::default().with_kernel_file(PROC_FILESYSTEMS, FILESYSTEMS));
        let probe = KernelFilesystems::read_only(host.clone());
        assert!(probe.enable("aufs").await.is_err());
        assert_eq!(host.mutations(), 0);
    }

    #[tokio::test]
    async fn loaded_module_is_not_probed_again() {
        let host = MemoryHost::default().with_kernel_file(
            PROC_MODULES,
            "br_netfilter 32768 0 - Live 0x0000000000000000\nbridge 200704 1 br_netfilter, Live 0x0\n",
        );
        assert!(ensure_kernel_module(&host, "br_netfilter").await);
        assert!(host.commands().is_empty());
    }

    #[tokio::test]
    async fn module_load_failure_is_only_a_warning() {
        let host = MemoryHost::default()
            .fail_run("/sbin/modprobe br_netfilter", "not found")
            .respond("unused", CommandOutput::ok(""));
        assert!(!ensure_kernel_module(&host, "br_netfilter").await);
        assert_eq!(host.commands().len(), 1);
    }
}
