//! Relay configuration using Figment
//!
//! Configuration is loaded from, in increasing priority:
//! 1. built-in defaults
//! 2. `config/relay.toml` (or the file given with `--config`)
//! 3. environment variables prefixed with `TC08_RELAY_`, nested keys separated by `__`
//!
//! # Example
//! ```no_run
//! use tc08_relay::config::RelayConfig;
//!
//! // TC08_RELAY_SERVER__BIND_ADDRESS=127.0.0.1:9000 overrides the file
//! let config = RelayConfig::load()?;
//! println!("Listening on {}", config.server.bind_address);
//! # Ok::<(), figment::Error>(())
//! ```

use std::net::SocketAddr;
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::device::TemperatureUnit;
use crate::driver::CHANNEL_COUNT;
use crate::logging::OutputFormat;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "TC08_RELAY_";

/// Top-level relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener settings
    pub server: ServerConfig,
    /// Instrument settings
    pub instrument: InstrumentConfig,
    /// Log output settings
    pub logging: LoggingConfig,
}

/// WebSocket listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the relay listens on
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8001".to_string(),
        }
    }
}

/// Which driver implementation backs each session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverBackend {
    /// The vendor library (requires the `hardware` feature)
    #[default]
    Hardware,
    /// In-memory simulated instrument
    Mock,
}

/// Instrument configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Unit readings are reported in
    pub units: TemperatureUnit,
    /// Driver implementation
    pub backend: DriverBackend,
    /// Fixed readings for the mock backend, cold-junction channel first
    pub mock_readings: Option<Vec<f32>>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: OutputFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::Pretty,
        }
    }
}

impl RelayConfig {
    /// Load configuration from `config/relay.toml` and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path. A missing file leaves the
    /// defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref(), ENV_PREFIX).extract()
    }

    fn figment(path: &Path, env_prefix: &str) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(env_prefix).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind_address '{}'. Expected host:port, e.g. 0.0.0.0:8001",
                self.server.bind_address
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        if let Some(readings) = &self.instrument.mock_readings {
            if readings.len() != CHANNEL_COUNT {
                return Err(format!(
                    "mock_readings must have {} values (cold junction first), got {}",
                    CHANNEL_COUNT,
                    readings.len()
                ));
            }
        }

        Ok(())
    }

    /// Mock readings as a fixed-size buffer, if configured.
    pub fn mock_readings(&self) -> Option<[f32; CHANNEL_COUNT]> {
        self.instrument
            .mock_readings
            .as_deref()
            .and_then(|values| values.try_into().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8001");
        assert_eq!(config.instrument.units, TemperatureUnit::Kelvin);
        assert_eq!(config.instrument.backend, DriverBackend::Hardware);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:8001");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
bind_address = "127.0.0.1:9100"

[instrument]
units = "celsius"
backend = "mock"
mock_readings = [21.0, 22.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = RelayConfig::load_from(file.path()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:9100");
        assert_eq!(config.instrument.units, TemperatureUnit::Celsius);
        assert_eq!(config.instrument.backend, DriverBackend::Mock);
        assert_eq!(config.mock_readings().unwrap()[1], 22.0);
        assert!(matches!(config.logging.format, OutputFormat::Json));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind_address = \"127.0.0.1:9100\"").unwrap();

        // Unique prefix so parallel tests never see this variable
        std::env::set_var("TC08_RELAY_ENV_TEST_SERVER__BIND_ADDRESS", "127.0.0.1:9200");
        let config: RelayConfig = RelayConfig::figment(file.path(), "TC08_RELAY_ENV_TEST_")
            .extract()
            .unwrap();
        std::env::remove_var("TC08_RELAY_ENV_TEST_SERVER__BIND_ADDRESS");

        assert_eq!(config.server.bind_address, "127.0.0.1:9200");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = RelayConfig::default();
        config.server.bind_address = "localhost".to_string();
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        let mut config = RelayConfig::default();
        config.instrument.mock_readings = Some(vec![1.0, 2.0]);
        assert!(config.validate().is_err());
        assert!(config.mock_readings().is_none());
    }

    #[test]
    fn test_unknown_unit_fails_extraction() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[instrument]\nunits = \"rankine\"").unwrap();
        assert!(RelayConfig::load_from(file.path()).is_err());
    }
}
