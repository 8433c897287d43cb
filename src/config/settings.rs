use std::path::Path;

use super::{ConfigError, ConfigSource};

/// TOML-backed settings with environment overrides.
///
/// A dotted key maps to an environment variable by upper-casing and
/// replacing dots with underscores under the `POTD_` prefix, so
/// `log.search.address` is overridden by `POTD_LOG_SEARCH_ADDRESS`.
#[derive(Debug, Clone)]
pub struct Settings {
    root: toml::Value,
}

const ENV_PREFIX: &str = "POTD_";

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let root = raw.parse::<toml::Value>()?;
        Ok(Self { root })
    }

    /// An empty document; every getter returns `None` unless the
    /// environment provides the key.
    pub fn empty() -> Self {
        Self {
            root: toml::Value::Table(toml::map::Map::new()),
        }
    }

    fn lookup(&self, key: &str) -> Option<&toml::Value> {
        let mut node = &self.root;
        for segment in key.split('.') {
            node = node.as_table()?.get(segment)?;
        }
        Some(node)
    }

    fn env_override(key: &str) -> Option<String> {
        let var = format!("{ENV_PREFIX}{}", key.to_uppercase().replace('.', "_"));
        std::env::var(var).ok()
    }
}

impl ConfigSource for Settings {
    fn get_string(&self, key: &str) -> Option<String> {
        if let Some(value) = Self::env_override(key) {
            return Some(value);
        }
        self.lookup(key)?.as_str().map(str::to_string)
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        // An override that does not parse is ignored in favor of the file value.
        if let Some(value) = Self::env_override(key)
            && let Ok(parsed) = value.trim().parse()
        {
            return Some(parsed);
        }
        self.lookup(key)?.as_integer()
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        if let Some(value) = Self::env_override(key)
            && let Ok(parsed) = value.trim().parse()
        {
            return Some(parsed);
        }
        self.lookup(key)?.as_bool()
    }
}
