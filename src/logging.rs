//! Tracing setup for the ingestion service.
//!
//! Events go to stdout and to a log file. `CLARIFY_LOG_FILE` selects the file sink:
//! unset appends to a daily rolling file under `CLARIFY_LOG_DIR` (default `logs`), `off`
//! disables file logging, and any other value is used as a path to append to.
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "clarify-ingest.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where file logs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    /// No file logging.
    Disabled,
    /// Append to a single file.
    File(PathBuf),
    /// Daily rolling files in a directory.
    Rolling(PathBuf),
}

impl LogSink {
    /// Resolve the sink from the raw `CLARIFY_LOG_FILE` and `CLARIFY_LOG_DIR` values.
    pub fn resolve(log_file: Option<&str>, log_dir: Option<&str>) -> Self {
        match log_file.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) if value.eq_ignore_ascii_case("off") => Self::Disabled,
            Some(path) => Self::File(PathBuf::from(path)),
            None => Self::Rolling(PathBuf::from(
                log_dir
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .unwrap_or(DEFAULT_LOG_DIR),
            )),
        }
    }

    fn from_env() -> Self {
        let log_file = std::env::var("CLARIFY_LOG_FILE").ok();
        let log_dir = std::env::var("CLARIFY_LOG_DIR").ok();
        Self::resolve(log_file.as_deref(), log_dir.as_deref())
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` filters events (default `info`). Calling this twice panics, as with any
/// global subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();
    let file_layer = open_writer(&LogSink::from_env()).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

fn open_writer(sink: &LogSink) -> Option<NonBlocking> {
    let (writer, guard) = match sink {
        LogSink::Disabled => return None,
        LogSink::File(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => tracing_appender::non_blocking(file),
            Err(err) => {
                report_sink_failure(path, &err);
                return None;
            }
        },
        LogSink::Rolling(dir) => {
            if let Err(err) = std::fs::create_dir_all(dir) {
                report_sink_failure(dir, &err);
                return None;
            }
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}

// The subscriber is not installed yet, so stderr is the only channel.
fn report_sink_failure(path: &Path, err: &std::io::Error) {
    eprintln!("File logging disabled, cannot open {}: {err}", path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_rolling_logs_directory() {
        assert_eq!(
            LogSink::resolve(None, None),
            LogSink::Rolling(PathBuf::from("logs"))
        );
        assert_eq!(
            LogSink::resolve(Some("  "), Some("/var/log/clarify")),
            LogSink::Rolling(PathBuf::from("/var/log/clarify"))
        );
    }

    #[test]
    fn explicit_file_and_off() {
        assert_eq!(
            LogSink::resolve(Some("/tmp/ingest.log"), Some("ignored")),
            LogSink::File(PathBuf::from("/tmp/ingest.log"))
        );
        assert_eq!(LogSink::resolve(Some("OFF"), None), LogSink::Disabled);
    }

    #[test]
    fn unopenable_file_yields_no_writer() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = LogSink::File(dir.path().join("missing").join("ingest.log"));
        assert!(open_writer(&sink).is_none());
    }
}
