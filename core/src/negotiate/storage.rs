use super::{CapabilityProbe, Negotiator};

/// Negotiator for docker storage drivers. The `overlay2` driver runs on the
/// kernel's `overlay` filesystem.
pub fn storage_negotiator(probe: &dyn CapabilityProbe) -> Negotiator<'_> {
    Negotiator::new("docker storage", probe).with_alias("overlay2", "overlay")
}

/// Resolve a docker storage setting.
///
/// A single driver is kept as configured. A comma-separated list is a
/// precedence list, negotiated against the running kernel.
pub async fn select_storage_driver(
    storage: Option<&str>,
    probe: &dyn CapabilityProbe,
) -> Option<String> {
    let storage = storage?;
    if !storage.contains(',') {
        return Some(storage.to_string());
    }

    let precedence: Vec<&str> = storage
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if precedence.is_empty() {
        tracing::warn!(storage, "docker storage list names no driver, keeping it as configured");
        return Some(storage.to_string());
    }

    storage_negotiator(probe)
        .negotiate(&precedence)
        .await
        .map(|d| d.chosen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProbe;

    #[tokio::test]
    async fn single_driver_is_not_probed() {
        let probe = ScriptedProbe::supporting(&[]);
        let chosen = select_storage_driver(Some("devicemapper"), &probe).await;
        assert_eq!(chosen.as_deref(), Some("devicemapper"));
        assert_eq!(probe.probes(), 0);
    }

    #[tokio::test]
    async fn precedence_list_is_negotiated() {
        let probe = ScriptedProbe::supporting(&["aufs"]);
        let chosen = select_storage_driver(Some("overlay2, aufs"), &probe).await;
        assert_eq!(chosen.as_deref(), Some("aufs"));
        assert_eq!(probe.enabled(), vec!["overlay".to_string()]);
    }

    #[tokio::test]
    async fn list_without_drivers_is_kept_as_configured() {
        let probe = ScriptedProbe::supporting(&["overlay"]);
        let chosen = select_storage_driver(Some(" , "), &probe).await;
        assert_eq!(chosen.as_deref(), Some(" , "));
        assert_eq!(probe.probes(), 0);
    }

    #[tokio::test]
    async fn unset_storage_stays_unset() {
        let probe = ScriptedProbe::supporting(&[]);
        assert_eq!(select_storage_driver(None, &probe).await, None);
    }
}
