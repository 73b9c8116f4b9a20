//! Global `tracing` subscriber setup driven by [`LoggingSettings`].

use crate::settings::{LogFormat, LoggingSettings};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logging is already initialised")]
    AlreadyInitialised,
}

/// Filter from `RUST_LOG` when set, otherwise from the configured level.
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_directive()))
}

/// Install the global subscriber. Console output goes to stderr so command
/// output on stdout stays clean; a log file, when set, always receives JSON.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let file_layer = match &settings.log_file_path {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|source| LoggingError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::LogFile {
                    path: path.clone(),
                    source,
                })?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let json_layer = (settings.log_format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (settings.log_format != LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(settings.log_format == LogFormat::Console)
    });

    tracing_subscriber::registry()
        .with(env_filter(settings))
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialised)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::LogLevel;

    #[test]
    fn unopenable_log_file_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = LoggingSettings {
            log_level: LogLevel::Debug,
            log_format: LogFormat::Plain,
            // A directory cannot be opened for appending.
            log_file_path: Some(dir.path().to_path_buf()),
        };
        let err = init_logging(&settings).unwrap_err();
        assert!(matches!(err, LoggingError::LogFile { .. }));
    }
}
