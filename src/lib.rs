#![deny(warnings, rust_2024_compatibility)]
// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_possible_truncation, // Safe within realistic value bounds (durations, sizes)
    clippy::missing_errors_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. SinkError in telemetry module
    clippy::must_use_candidate        // Annotated selectively on critical APIs
)]

pub mod config;
pub mod feed;
pub mod fetch;
pub mod telemetry;

// Re-export main types for easy access
pub use config::{ConfigError, ConfigSource, Settings};
pub use fetch::{FetchError, FetchResponse, Fetcher};
pub use telemetry::{TelemetryError, TelemetryHandle};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
