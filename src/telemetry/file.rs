use std::ffi::OsStr;
use std::path::Path;

use tracing_appender::rolling;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use super::SinkError;
use super::chain::{BuiltSink, FileSinkConfig};

/// Builds the rotating file sink. The configured path is split into
/// directory, prefix, and suffix for the rolling appender; rotation is
/// daily, and the retained file count is bounded by both the backup cap
/// and the max-age in days (one file per day).
pub(crate) fn build(config: &FileSinkConfig) -> Result<BuiltSink, SinkError> {
    let directory = config
        .path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = config
        .path
        .file_stem()
        .and_then(OsStr::to_str)
        .ok_or_else(|| SinkError::InvalidFilePath(config.path.display().to_string()))?;
    let suffix = config
        .path
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or("log");

    let appender = rolling::Builder::new()
        .filename_prefix(prefix)
        .filename_suffix(suffix)
        .rotation(rolling::Rotation::DAILY)
        .max_log_files(config.max_backups.min(config.max_age_days))
        .build(directory)?;

    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        // Caller-location reporting stays off: a deliberate verbosity
        // trade-off, mirrored by every sink in the chain.
        .with_file(false)
        .with_line_number(false);

    let layer = if config.pretty {
        layer
            .pretty()
            .with_filter(LevelFilter::from_level(config.level))
            .boxed()
    } else {
        layer
            .json()
            .with_filter(LevelFilter::from_level(config.level))
            .boxed()
    };

    Ok(BuiltSink {
        layer,
        guard: Some(guard),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tracing::Level;

    fn config(path: &Path) -> FileSinkConfig {
        FileSinkConfig {
            path: path.to_path_buf(),
            max_size_mb: 100,
            max_backups: 3,
            max_age_days: 7,
            pretty: false,
            level: Level::INFO,
        }
    }

    #[test]
    fn builds_in_a_writable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sink = build(&config(&dir.path().join("app.log"))).unwrap();
        assert!(sink.guard.is_some());
    }

    #[test]
    fn fails_when_parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let result = build(&config(&blocker.join("sub").join("app.log")));
        assert!(matches!(result, Err(SinkError::Appender(_))));
    }

    #[test]
    fn rejects_a_path_without_a_file_name() {
        let result = build(&config(&PathBuf::from("/")));
        assert!(matches!(result, Err(SinkError::InvalidFilePath(_))));
    }
}
