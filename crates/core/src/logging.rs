use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Overrides the log directory (default `~/.assetkeep/logs`).
pub const LOG_DIR_ENV: &str = "ASSETKEEP_LOG_DIR";
/// Filter directives for assetkeep; `RUST_LOG` is used when unset.
pub const LOG_FILTER_ENV: &str = "ASSETKEEP_LOG";

fn log_dir(override_dir: Option<String>, home: Option<String>) -> PathBuf {
    match override_dir.filter(|dir| !dir.trim().is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => Path::new(&home.unwrap_or_else(|| ".".to_string())).join(".assetkeep/logs"),
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber for one CLI component.
///
/// Keep the returned guard alive for the life of the process, dropping it
/// flushes and stops the file writer.
pub fn init_logging(component: &str, to_stderr: bool) -> WorkerGuard {
    let log_dir = log_dir(std::env::var(LOG_DIR_ENV).ok(), std::env::var("HOME").ok());
    let _ = std::fs::create_dir_all(&log_dir);

    // Roll daily, named after the component: watch.log.2026-10-19
    let file_appender = tracing_appender::rolling::daily(&log_dir, format!("{component}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // File layer: plain text, keeps the target module
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    let registry = tracing_subscriber::registry().with(filter()).with(file_layer);

    if to_stderr {
        // Long-running commands also echo to the terminal
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false);
        let _ = registry.with(stderr_layer).try_init();
    } else {
        let _ = registry.try_init();
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_prefers_override() {
        assert_eq!(
            log_dir(Some("/var/log/assetkeep".into()), Some("/home/dev".into())),
            PathBuf::from("/var/log/assetkeep")
        );
        assert_eq!(
            log_dir(Some("  ".into()), Some("/home/dev".into())),
            PathBuf::from("/home/dev/.assetkeep/logs")
        );
        assert_eq!(log_dir(None, None), PathBuf::from("./.assetkeep/logs"));
    }
}
