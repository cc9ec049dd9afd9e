//! instrument-ctl configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/instruments.toml` unless `--config` is given)
//! 2. environment variables prefixed with `INSTRUMENT_CTL_`; nested keys are
//!    separated by a double underscore, e.g.
//!    `INSTRUMENT_CTL_APPLICATION__LOG_LEVEL=debug`
//!
//! ```toml
//! [application]
//! name = "bench"
//! log_level = "info"
//! log_format = "compact"
//! log_span_events = false
//! log_file_and_line = false
//! log_ansi = true
//!
//! [[instruments]]
//! id = "counter"
//! type = "philips_pm6669"
//! config = { port = "/dev/ttyUSB0", gpib_address = 10, srq_mask = 1 }
//! ```

use crate::logging::OutputFormat;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "INSTRUMENT_CTL_";

/// Error types for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Parse error (invalid TOML or wrong field types)
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Validation error
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Instrument definitions
    #[serde(default)]
    pub instruments: Vec<InstrumentDefinition>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: OutputFormat,
    /// Emit span open/close events
    #[serde(default)]
    pub log_span_events: bool,
    /// Include source file and line in log records
    #[serde(default)]
    pub log_file_and_line: bool,
    /// Colored output (pretty format only)
    #[serde(default = "default_log_ansi")]
    pub log_ansi: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: OutputFormat::default(),
            log_span_events: false,
            log_file_and_line: false,
            log_ansi: default_log_ansi(),
        }
    }
}

/// Instrument definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentDefinition {
    /// Unique instrument identifier
    pub id: String,
    /// Driver type (e.g., "philips_pm6669", "tti_pl330pd")
    pub r#type: String,
    /// Whether this instrument is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Driver-specific configuration, handed to the factory as-is
    #[serde(default = "empty_table")]
    pub config: toml::Value,
}

fn default_name() -> String {
    "instrument-ctl".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_ansi() -> bool {
    true
}

fn default_enabled() -> bool {
    true
}

fn empty_table() -> toml::Value {
    toml::Value::Table(toml::map::Map::new())
}

impl AppConfig {
    /// Load configuration from `path` plus environment overrides.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigLoadError::NotFound(path.display().to_string()));
        }

        let config: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigLoadError::ParseError(e.to_string()))?;

        tracing::debug!(
            path = %path.display(),
            instruments = config.instruments.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        crate::logging::parse_log_level(&self.application.log_level)
            .map_err(ConfigLoadError::ValidationError)?;

        let mut ids = HashSet::new();
        for instrument in &self.instruments {
            if instrument.id.trim().is_empty() {
                return Err(ConfigLoadError::ValidationError(
                    "Instrument ID must not be empty".to_string(),
                ));
            }
            if !ids.insert(&instrument.id) {
                return Err(ConfigLoadError::ValidationError(format!(
                    "Duplicate instrument ID: {}",
                    instrument.id
                )));
            }
        }

        Ok(())
    }

    /// Get all enabled instruments
    pub fn enabled_instruments(&self) -> Vec<&InstrumentDefinition> {
        self.instruments
            .iter()
            .filter(|inst| inst.enabled)
            .collect()
    }

    /// Look up an instrument by ID.
    pub fn instrument(&self, id: &str) -> Option<&InstrumentDefinition> {
        self.instruments.iter().find(|inst| inst.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BENCH: &str = r#"
[application]
name = "bench"
log_level = "debug"
log_format = "json"
log_file_and_line = true
log_ansi = false

[[instruments]]
id = "counter"
type = "philips_pm6669"
config = { port = "/dev/ttyUSB0", gpib_address = 10, srq_mask = 1 }

[[instruments]]
id = "supply"
type = "tti_pl330pd"
enabled = false

[instruments.config]
port = "/dev/ttyS0"
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_load_config() {
        let file = write_config(BENCH);
        let config = AppConfig::load_from(file.path()).unwrap();

        assert_eq!(config.application.name, "bench");
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.application.log_format, OutputFormat::Json);
        assert!(config.application.log_file_and_line);
        assert!(!config.application.log_ansi);
        assert!(!config.application.log_span_events);
        assert_eq!(config.instruments.len(), 2);
        assert!(config.validate().is_ok());

        let counter = config.instrument("counter").unwrap();
        assert_eq!(counter.r#type, "philips_pm6669");
        assert_eq!(
            counter.config.get("gpib_address").and_then(toml::Value::as_integer),
            Some(10)
        );

        let enabled: Vec<&str> = config
            .enabled_instruments()
            .iter()
            .map(|inst| inst.id.as_str())
            .collect();
        assert_eq!(enabled, vec!["counter"]);
    }

    #[test]
    #[serial]
    fn test_defaults() {
        let file = write_config("");
        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.name, "instrument-ctl");
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.application.log_format, OutputFormat::Pretty);
        assert!(config.application.log_ansi);
        assert!(config.instruments.is_empty());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        let file = write_config(BENCH);
        std::env::set_var("INSTRUMENT_CTL_APPLICATION__LOG_LEVEL", "warn");
        let result = AppConfig::load_from(file.path());
        std::env::remove_var("INSTRUMENT_CTL_APPLICATION__LOG_LEVEL");

        assert_eq!(result.unwrap().application.log_level, "warn");
    }

    #[test]
    #[serial]
    fn test_missing_file() {
        let err = AppConfig::load_from("/nonexistent/instruments.toml").unwrap_err();
        assert!(matches!(err, ConfigLoadError::NotFound(_)));
    }

    #[test]
    #[serial]
    fn test_invalid_toml() {
        let file = write_config("[[instruments]]\nid = 3\n");
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::ParseError(_)));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = AppConfig {
            application: ApplicationConfig::default(),
            instruments: vec![],
        };
        assert!(config.validate().is_ok());

        config.application.log_level = "loud".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigLoadError::ValidationError(_))
        ));
    }

    #[test]
    fn test_duplicate_instrument_ids() {
        let instrument = InstrumentDefinition {
            id: "counter".to_string(),
            r#type: "philips_pm6669".to_string(),
            enabled: true,
            config: empty_table(),
        };
        let config = AppConfig {
            application: ApplicationConfig::default(),
            instruments: vec![instrument.clone(), instrument],
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate instrument ID: counter"));
    }
}
