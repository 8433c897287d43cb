mod chain;
mod file;
mod handle;
mod search;
mod shipper;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

pub use chain::{FileSinkConfig, SearchSinkConfig, ShipperSinkConfig, build};
pub use handle::TelemetryHandle;

/// One step of the sink chain. The chain is an ordered plan of these, so
/// the fatal-vs-best-effort composition rule lives in [`SinkKind::policy`]
/// rather than in control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Rotating log file. The availability-critical sink.
    File,
    /// Colorized pretty stream to standard output (debug mode only).
    Stdout,
    /// Line-shipping remote sink: NDJSON over TCP (production only).
    Shipper,
    /// Search-indexed remote store (production only).
    Search,
}

impl SinkKind {
    pub fn policy(self) -> SinkPolicy {
        match self {
            SinkKind::File | SinkKind::Stdout => SinkPolicy::Required,
            SinkKind::Shipper | SinkKind::Search => SinkPolicy::BestEffort,
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SinkKind::File => "file",
            SinkKind::Stdout => "stdout",
            SinkKind::Shipper => "shipper",
            SinkKind::Search => "search",
        };
        f.write_str(name)
    }
}

/// What a sink construction failure does to the chain as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkPolicy {
    /// Failure aborts construction; the process must not run without this sink.
    Required,
    /// Failure is logged as a warning and the sink is omitted.
    BestEffort,
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to initialize required {kind} sink: {source}")]
    RequiredSinkFailed {
        kind: SinkKind,
        #[source]
        source: SinkError,
    },
    #[error("failed to install global default subscriber: {0}")]
    InstallFailed(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("log file path not configured")]
    MissingFilePath,
    #[error("log file path has no usable file name: {0}")]
    InvalidFilePath(String),
    #[error("failed to initialize rolling file appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),
    #[error("destination not found")]
    DestinationNotFound,
    #[error("invalid connection timeout: {0}")]
    InvalidTimeout(#[from] ConfigError),
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("negotiation failed: {0}")]
    Negotiation(#[from] reqwest::Error),
    #[error("negotiation timed out after {0:?}")]
    NegotiationTimeout(Duration),
    #[error("destination rejected negotiation: HTTP {0}")]
    NegotiationRejected(u16),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_sinks_are_required_remotes_are_best_effort() {
        assert_eq!(SinkKind::File.policy(), SinkPolicy::Required);
        assert_eq!(SinkKind::Stdout.policy(), SinkPolicy::Required);
        assert_eq!(SinkKind::Shipper.policy(), SinkPolicy::BestEffort);
        assert_eq!(SinkKind::Search.policy(), SinkPolicy::BestEffort);
    }
}
