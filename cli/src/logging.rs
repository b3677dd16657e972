//! Log setup for the `nodeup` binary.
//!
//! Console output always goes to stderr: dry-run reports and cloud-init
//! scripts may be written to stdout.

use std::path::PathBuf;

use nodeup_core::api::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured level when it is set and non-blank.
pub fn log_filter(logging: &LoggingConfig, rust_log: Option<&str>) -> Result<EnvFilter, String> {
    let directives = match rust_log.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => logging.level.trim(),
    };
    EnvFilter::try_new(directives).map_err(|e| format!("invalid log filter {directives:?}: {e}"))
}

/// Per-process log file, `None` when file logging is off.
pub fn log_file(logging: &LoggingConfig, pid: u32) -> Option<PathBuf> {
    if !logging.file {
        return None;
    }
    let dir = logging
        .directory
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("nodeup"));
    Some(dir.join(format!("nodeup.{pid}.log")))
}

/// Install the global subscriber. The returned guard flushes the file writer
/// on drop and must live until the process exits.
pub fn init(logging: &LoggingConfig) -> Result<Option<WorkerGuard>, String> {
    if !logging.enabled {
        return Ok(None);
    }
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = log_filter(logging, rust_log.as_deref())?;

    let file = log_file(logging, std::process::id());
    if !logging.console && file.is_none() {
        return Err("logging is enabled but neither console nor file output is".to_string());
    }

    let mut guard = None;
    let file_layer = match file {
        Some(path) => {
            let (dir, name) = match (path.parent(), path.file_name()) {
                (Some(dir), Some(name)) => (dir.to_path_buf(), name.to_os_string()),
                _ => return Err(format!("bad log file path {}", path.display())),
            };
            std::fs::create_dir_all(&dir)
                .map_err(|e| format!("error creating log directory {}: {e}", dir.display()))?;
            let (writer, flush) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            guard = Some(flush);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| e.to_string())?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging() -> LoggingConfig {
        LoggingConfig {
            enabled: true,
            console: true,
            file: false,
            level: "warn".into(),
            directory: None,
        }
    }

    #[test]
    fn rust_log_overrides_configured_level() {
        let cfg = logging();
        assert_eq!(log_filter(&cfg, None).unwrap().to_string(), "warn");
        assert_eq!(log_filter(&cfg, Some("  ")).unwrap().to_string(), "warn");
        assert_eq!(
            log_filter(&cfg, Some("nodeup_core=debug")).unwrap().to_string(),
            "nodeup_core=debug"
        );
    }

    #[test]
    fn log_file_defaults_to_temp_dir() {
        let mut cfg = logging();
        assert_eq!(log_file(&cfg, 42), None);

        cfg.file = true;
        cfg.directory = Some(" ".into());
        assert_eq!(
            log_file(&cfg, 42),
            Some(std::env::temp_dir().join("nodeup").join("nodeup.42.log"))
        );

        cfg.directory = Some("/var/log/nodeup".into());
        assert_eq!(
            log_file(&cfg, 42),
            Some(PathBuf::from("/var/log/nodeup/nodeup.42.log"))
        );
    }

    #[test]
    fn enabled_logging_needs_an_output() {
        let mut cfg = logging();
        cfg.console = false;
        assert!(init(&cfg).unwrap_err().contains("neither console nor file"));
    }
}
