mod settings;

use std::time::Duration;
use thiserror::Error;

pub use settings::Settings;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid duration {value:?}: {source}")]
    InvalidDuration {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("Invalid duration {0:?}: unknown unit")]
    UnknownDurationUnit(String),
    #[error("Invalid duration {0:?}: value out of range")]
    DurationOutOfRange(String),
}

/// Read-only view over the process configuration, keyed by dotted paths
/// (`log.search.address`). The telemetry chain and anything else in the
/// crate consume this trait, never a concrete loader.
pub trait ConfigSource: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;
    fn get_int(&self, key: &str) -> Option<i64>;
    fn get_bool(&self, key: &str) -> Option<bool>;
}

/// Parses Go-style duration strings: `"750ms"`, `"30s"`, `"5m"`, `"2h"`.
/// A bare integer is taken as seconds.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();

    let (digits, unit) = match trimmed.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => trimmed.split_at(idx),
        None => (trimmed, "s"),
    };

    let amount: u64 = digits.parse().map_err(|source| ConfigError::InvalidDuration {
        value: value.to_string(),
        source,
    })?;

    let scaled = |factor: u64| {
        amount
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::DurationOutOfRange(value.to_string()))
    };

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => scaled(60),
        "h" => scaled(3600),
        _ => Err(ConfigError::UnknownDurationUnit(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unit_suffixes() {
        assert_eq!(parse_duration("750ms").unwrap(), Duration::from_millis(750));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn bare_integer_is_seconds() {
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration(" 45 ").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_duration("abc"),
            Err(ConfigError::InvalidDuration { .. })
        ));
        assert!(matches!(
            parse_duration(""),
            Err(ConfigError::InvalidDuration { .. })
        ));
        assert!(matches!(
            parse_duration("30parsecs"),
            Err(ConfigError::UnknownDurationUnit(_))
        ));
    }

    #[test]
    fn rejects_values_that_overflow_when_scaled() {
        assert!(matches!(
            parse_duration("18446744073709551615h"),
            Err(ConfigError::DurationOutOfRange(_))
        ));
        assert!(matches!(
            parse_duration("1000000000000000000m"),
            Err(ConfigError::DurationOutOfRange(_))
        ));
    }
}
