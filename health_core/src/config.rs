//! Configuration file support for hkq.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/hkq/config.toml`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub units: UnitsConfig,

    #[serde(default)]
    pub queries: QueriesConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub fixture: FixtureConfig,
}

/// Unit handling
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct UnitsConfig {
    /// Reject explicit units outside the identifier's unit family
    #[serde(default)]
    pub strict: bool,
}

/// Query defaults
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueriesConfig {
    /// Limit used when a query does not give one; 0 means no limit
    #[serde(default = "default_limit")]
    pub default_limit: u32,
}

impl Default for QueriesConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

/// Change event delivery
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

/// Location of the fixture document backing the in-memory bridge
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FixtureConfig {
    #[serde(default = "default_fixture_path")]
    pub path: PathBuf,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            path: default_fixture_path(),
        }
    }
}

fn home_dir_or_cwd() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_fixture_path() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| home_dir_or_cwd().join(".local/share"));
    base.join("hkq").join("fixture.json")
}

fn default_limit() -> u32 {
    10
}

fn default_buffer_size() -> usize {
    crate::memory::DEFAULT_EVENT_BUFFER
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| home_dir_or_cwd().join(".config"));
        base.join("hkq").join("config.toml")
    }

    pub fn validate(&self) -> Result<()> {
        if self.events.buffer_size == 0 {
            return Err(Error::Config("events.buffer_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.units.strict);
        assert_eq!(config.queries.default_limit, 10);
        assert_eq!(config.events.buffer_size, 64);
        assert!(config.fixture.path.ends_with("hkq/fixture.json"));
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.units.strict = true;
        config.queries.default_limit = 25;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.units.strict);
        assert_eq!(loaded.queries.default_limit, 25);
        assert_eq!(loaded.fixture.path, config.fixture.path);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[units]
strict = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.units.strict);
        assert_eq!(config.events.buffer_size, 64); // default
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[events]\nbuffer_size = 0\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
