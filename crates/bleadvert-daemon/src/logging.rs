//! Logging initialization.
//!
//! - [`LogMode::Production`]: JSON to daily rolling files, compact lines to stdout
//! - [`LogMode::Development`]: pretty stdout with span events

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fallback filter when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "BLEADVERT_LOG_LEVEL";

/// Set to `production` to select [`LogMode::Production`].
pub const RUN_ENV: &str = "BLEADVERT_ENV";

/// Overrides the production log directory.
pub const LOG_DIR_ENV: &str = "BLEADVERT_LOG_DIR";

static GUARDS: OnceLock<(WorkerGuard, WorkerGuard)> = OnceLock::new();

/// Output style of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Under systemd: journald-friendly stdout plus JSON files.
    Production,
    /// Interactive use.
    Development,
}

impl LogMode {
    /// Production when `forced` is set or `BLEADVERT_ENV=production`.
    #[must_use]
    pub fn detect(forced: bool) -> Self {
        let from_env = std::env::var(RUN_ENV)
            .is_ok_and(|value| value.eq_ignore_ascii_case("production"));
        if forced || from_env {
            Self::Production
        } else {
            Self::Development
        }
    }
}

/// Install the global subscriber.
///
/// The filter comes from `RUST_LOG`, then `BLEADVERT_LOG_LEVEL`, then `info`.
///
/// # Errors
///
/// Returns an error if the filter directive cannot be parsed, if the
/// production log directory cannot be created, or if a global subscriber is
/// already installed.
pub fn init(mode: LogMode) -> anyhow::Result<()> {
    let log_level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    match mode {
        LogMode::Production => init_production(env_filter, &log_directory()),
        LogMode::Development => init_development(env_filter),
    }
}

fn init_production(env_filter: EnvFilter, log_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("bleadvert")
        .build(log_dir)
        .with_context(|| format!("Failed to open log file in {}", log_dir.display()))?;
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(stdout_writer)
                .with_target(false)
                .with_ansi(false),
        )
        .try_init()?;

    let _ = GUARDS.set((file_guard, stdout_guard));
    Ok(())
}

fn init_development(env_filter: EnvFilter) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE),
        )
        .try_init()?;
    Ok(())
}

/// Production log directory: `BLEADVERT_LOG_DIR`, else the platform default.
fn log_directory() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/bleadvert")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "bleadvert")
            .map_or_else(|| PathBuf::from("./logs"), |dirs| dirs.data_dir().join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_directory_is_valid_path() {
        assert!(!log_directory().as_os_str().is_empty());
    }

    #[test]
    fn test_forced_production_mode() {
        assert_eq!(LogMode::detect(true), LogMode::Production);
    }

    #[test]
    fn test_uncreatable_log_directory_is_an_error() {
        // A regular file where the directory should be: create_dir_all must fail.
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let log_dir = blocker.path().join("logs");

        let err = init_production(EnvFilter::new("info"), &log_dir).unwrap_err();
        assert!(err.to_string().contains("Failed to create log directory"));
        assert!(!log_dir.exists());
    }
}
