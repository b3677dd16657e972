use std::path::{Path, PathBuf};

use super::types::AppConfig;
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/nodeup/config.toml";
pub const LOCAL_CONFIG_PATH: &str = "nodeup.toml";

/// Load the agent configuration.
///
/// Priority: `explicit` path, then `/etc/nodeup/config.toml`, then
/// `./nodeup.toml`, then defaults. Environment variables override the file.
pub fn load_app_config(explicit: Option<&str>) -> Result<AppConfig, ConfigError> {
    let candidate = match explicit {
        Some(p) => Some(PathBuf::from(shellexpand::tilde(p).as_ref())),
        None => [DEFAULT_CONFIG_PATH, LOCAL_CONFIG_PATH]
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists()),
    };

    let mut cfg = match candidate {
        Some(path) => read_app_config(&path)?,
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut cfg, |k| std::env::var(k).ok());
    Ok(cfg)
}

fn read_app_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let location = path.display().to_string();
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Load {
        what: "agent config",
        location: location.clone(),
        source,
    })?;
    toml::from_str::<AppConfig>(&s).map_err(|e| ConfigError::Parse {
        what: "agent config",
        location,
        message: e.to_string(),
    })
}

pub(crate) fn apply_env_overrides(cfg: &mut AppConfig, env: impl Fn(&str) -> Option<String>) {
    let non_empty = |k: &str| env(k).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("NODEUP_TARGET") {
        cfg.target = v.trim().to_string();
    }
    if let Some(v) = non_empty("NODEUP_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    if let Some(v) = non_empty("NODEUP_MAX_CONCURRENCY") {
        match v.trim().parse::<usize>() {
            Ok(n) => cfg.executor.concurrency.max_concurrency = n,
            Err(_) => tracing::warn!("ignoring invalid NODEUP_MAX_CONCURRENCY={v:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_partial_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[logging]\nlevel = \"debug\"\n\n[executor.retry]\nstrategy = \"linear\"\nbase_delay_ms = 500\n"
        )
        .unwrap();

        let cfg = read_app_config(file.path()).unwrap();
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.console);
        assert_eq!(cfg.executor.retry.strategy, "linear");
        assert_eq!(cfg.executor.retry.base_delay_ms, 500);
        assert_eq!(cfg.executor.retry.max_task_duration_secs, 31_536_000);
        assert_eq!(cfg.target, "direct");
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging\nlevel=").unwrap();
        let err = read_app_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_win() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, |k| match k {
            "NODEUP_TARGET" => Some("dryrun".into()),
            "NODEUP_MAX_CONCURRENCY" => Some("4".into()),
            "NODEUP_LOG_LEVEL" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(cfg.target, "dryrun");
        assert_eq!(cfg.executor.concurrency.max_concurrency, 4);
        assert_eq!(cfg.logging.level, "info");
    }
}
