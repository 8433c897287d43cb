use std::path::PathBuf;

use tracing::{Dispatch, Level, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;

use super::{SinkError, SinkKind, SinkPolicy, TelemetryError, TelemetryHandle};
use crate::config::ConfigSource;

/// Rotating file sink parameters, resolved once from the configuration
/// surface and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    pub path: PathBuf,
    /// Accepted from the configuration surface for compatibility; rotation
    /// is daily with a backup cap, not size-based.
    pub max_size_mb: usize,
    pub max_backups: usize,
    pub max_age_days: usize,
    pub pretty: bool,
    pub level: Level,
}

impl FileSinkConfig {
    fn from_source(source: &dyn ConfigSource, level: Level) -> Result<Self, SinkError> {
        let path = source
            .get_string("log.file")
            .ok_or(SinkError::MissingFilePath)?;
        Ok(Self {
            path: PathBuf::from(path),
            max_size_mb: source.get_int("log.max_size").unwrap_or(100).max(1) as usize,
            max_backups: source.get_int("log.max_backups").unwrap_or(5).max(1) as usize,
            max_age_days: source.get_int("log.max_age").unwrap_or(28).max(1) as usize,
            pretty: source.get_bool("log.pretty").unwrap_or(false),
            level,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ShipperSinkConfig {
    pub address: String,
}

impl ShipperSinkConfig {
    fn from_source(source: &dyn ConfigSource) -> Self {
        Self {
            address: source.get_string("log.shipper.address").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchSinkConfig {
    pub address: String,
    pub connection_timeout: String,
    /// Sink-side identifier; documents are indexed under this name.
    pub service: String,
}

impl SearchSinkConfig {
    fn from_source(source: &dyn ConfigSource) -> Self {
        Self {
            address: source.get_string("log.search.address").unwrap_or_default(),
            connection_timeout: source
                .get_string("log.search.connection_timeout")
                .unwrap_or_default(),
            service: source.get_string("name").unwrap_or_else(|| "potd".to_string()),
        }
    }
}

pub(crate) type BoxedLayer = Box<dyn tracing_subscriber::Layer<Registry> + Send + Sync>;

/// A successfully attached sink: its layer, plus a worker guard when the
/// sink writes through a background thread.
pub(crate) struct BuiltSink {
    pub(crate) layer: BoxedLayer,
    pub(crate) guard: Option<WorkerGuard>,
}

const DEBUG_PLAN: &[SinkKind] = &[SinkKind::File, SinkKind::Stdout];
const PRODUCTION_PLAN: &[SinkKind] = &[SinkKind::File, SinkKind::Shipper, SinkKind::Search];

/// Composes the sink chain for the current operating mode and returns the
/// shared handle.
///
/// The plan is an ordered slice of [`SinkKind`]s; one loop applies each
/// kind's [`SinkPolicy`] uniformly. A required sink failure aborts
/// construction. A best-effort failure omits the sink and is reported as a
/// warning through the handle itself once the remaining chain exists.
pub async fn build(source: &dyn ConfigSource) -> Result<TelemetryHandle, TelemetryError> {
    let debug = source.get_bool("debug").unwrap_or(false);
    let level = if debug {
        // Debug mode always gets the most verbose threshold.
        Level::TRACE
    } else {
        level_from_code(source.get_int("log.level").unwrap_or(4))
    };

    let plan = if debug { DEBUG_PLAN } else { PRODUCTION_PLAN };

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut attached: Vec<SinkKind> = Vec::new();
    let mut degraded: Vec<String> = Vec::new();

    for &kind in plan {
        match build_sink(kind, source, level).await {
            Ok(sink) => {
                layers.push(sink.layer);
                if let Some(guard) = sink.guard {
                    guards.push(guard);
                }
                attached.push(kind);
            }
            Err(source_err) => match kind.policy() {
                SinkPolicy::Required => {
                    return Err(TelemetryError::RequiredSinkFailed {
                        kind,
                        source: source_err,
                    });
                }
                SinkPolicy::BestEffort => {
                    degraded.push(format!("failed to initialize {kind} sink: {source_err}"));
                }
            },
        }
    }

    let subscriber = tracing_subscriber::registry()
        .with(layers)
        .with(default_filter(level));
    let handle = TelemetryHandle::new(Dispatch::new(subscriber), level, attached, guards);

    // Best-effort degradation is reported through the chain that survived.
    handle.in_scope(|| {
        for message in &degraded {
            warn!("{message}");
        }
    });

    Ok(handle)
}

async fn build_sink(
    kind: SinkKind,
    source: &dyn ConfigSource,
    level: Level,
) -> Result<BuiltSink, SinkError> {
    match kind {
        SinkKind::File => super::file::build(&FileSinkConfig::from_source(source, level)?),
        SinkKind::Stdout => Ok(build_stdout()),
        SinkKind::Shipper => super::shipper::build(&ShipperSinkConfig::from_source(source)).await,
        SinkKind::Search => super::search::build(&SearchSinkConfig::from_source(source)).await,
    }
}

fn build_stdout() -> BuiltSink {
    let layer = fmt::layer()
        .pretty()
        .with_ansi(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stdout)
        .boxed();
    BuiltSink { layer, guard: None }
}

/// Severity threshold plus the usual directives quieting chatty HTTP
/// internals.
fn default_filter(level: Level) -> EnvFilter {
    EnvFilter::new(format!("{level},hyper=warn,reqwest=warn,h2=warn"))
}

/// Maps the configuration surface's integer severity (0 = panic, 6 =
/// trace) onto a `tracing` level.
fn level_from_code(code: i64) -> Level {
    match code {
        i64::MIN..=2 => Level::ERROR,
        3 => Level::WARN,
        4 => Level::INFO,
        5 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use serial_test::serial;

    #[test]
    fn severity_codes_map_to_levels() {
        assert_eq!(level_from_code(0), Level::ERROR);
        assert_eq!(level_from_code(2), Level::ERROR);
        assert_eq!(level_from_code(3), Level::WARN);
        assert_eq!(level_from_code(4), Level::INFO);
        assert_eq!(level_from_code(5), Level::DEBUG);
        assert_eq!(level_from_code(6), Level::TRACE);
        assert_eq!(level_from_code(99), Level::TRACE);
        assert_eq!(level_from_code(-1), Level::ERROR);
    }

    #[test]
    fn file_config_requires_a_path() {
        let settings = Settings::from_toml_str("debug = false").unwrap();
        assert!(matches!(
            FileSinkConfig::from_source(&settings, Level::INFO),
            Err(SinkError::MissingFilePath)
        ));
    }

    #[test]
    fn file_config_defaults_rotation_limits() {
        let settings = Settings::from_toml_str(
            r#"
            [log]
            file = "logs/app.log"
            "#,
        )
        .unwrap();
        let config = FileSinkConfig::from_source(&settings, Level::INFO).unwrap();
        assert_eq!(config.max_size_mb, 100);
        assert_eq!(config.max_backups, 5);
        assert_eq!(config.max_age_days, 28);
        assert!(!config.pretty);
    }

    // Serialized with the environment-override tests, which touch the
    // same POTD_ variables.
    #[test]
    #[serial]
    fn search_config_falls_back_to_crate_service_name() {
        let settings = Settings::from_toml_str("debug = false").unwrap();
        let config = SearchSinkConfig::from_source(&settings);
        assert_eq!(config.service, "potd");
        assert!(config.address.is_empty());
    }
}
