//! Diagnostic logging setup.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Diagnostic log directory under `base_dir`.
pub fn diagnostics_dir(base_dir: &Path) -> PathBuf {
    base_dir.join("log").join("diagnostics")
}

/// Default filter directive for `level`.
pub fn filter_directive(level: &str) -> String {
    format!("passive={},warn", level)
}

/// Initialize logging with file rotation.
///
/// Console output goes to stderr; stdout carries captured records. The
/// returned guard must be kept alive for the file writer to flush.
pub fn init_logging(level: &str, base_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(level)));

    if let Some(log_dir) = base_dir.map(diagnostics_dir) {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            // Rotates daily, keeps the last 5 files
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("passivescanner")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_live_under_log() {
        assert_eq!(
            diagnostics_dir(Path::new("/opt/scanner")),
            PathBuf::from("/opt/scanner/log/diagnostics")
        );
    }

    #[test]
    fn directive_targets_our_crates() {
        assert_eq!(filter_directive("debug"), "passive=debug,warn");
    }
}
