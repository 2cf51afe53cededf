//! Engine configuration loading
//!
//! Configuration is a small TOML file; every key has a built-in default so an
//! absent file is not an error.
//!
//! Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `SNDB_CONFIG` environment variable
//! 3. `<user config dir>/sndb/config.toml`
//! 4. Built-in defaults (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "SNDB_CONFIG";

/// Playback engine configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Position polling interval while a sound is playing
    ///
    /// Default: 200ms
    #[serde(default = "default_position_interval_ms")]
    pub position_interval_ms: u64,

    /// Reset the primary player automatically after it fails, so the next
    /// press retries from a clean slate
    #[serde(default = "default_auto_reset_primary")]
    pub auto_reset_primary: bool,

    /// Nice value applied to the audio command thread (unix only)
    ///
    /// Negative values raise priority and usually need privileges; `None`
    /// leaves the thread at the process default.
    #[serde(default = "default_command_thread_nice")]
    pub command_thread_nice: Option<i32>,

    /// Output device name (None = system default device)
    #[serde(default)]
    pub output_device: Option<String>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when RUST_LOG is not set (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_position_interval_ms() -> u64 {
    200
}

fn default_auto_reset_primary() -> bool {
    true
}

fn default_command_thread_nice() -> Option<i32> {
    Some(-10)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            position_interval_ms: default_position_interval_ms(),
            auto_reset_primary: default_auto_reset_primary(),
            command_thread_nice: default_command_thread_nice(),
            output_device: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration following the resolution priority.
    ///
    /// An explicitly named file (CLI or environment) must exist; the per-user
    /// file is optional. A file that exists but does not parse is an error.
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        let explicit = cli_arg
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                path
            }
            None => match user_config_file() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No config file found, using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };

        info!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content, &path)
    }

    /// Parse configuration from TOML text. `origin` is only used in errors.
    pub fn from_toml_str(content: &str, origin: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|source| Error::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.position_interval_ms == 0 {
            return Err(Error::Config(
                "position_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Position polling interval as a Duration
    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms)
    }
}

/// Per-user configuration file location for this platform
fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("sndb").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = EngineConfig::from_toml_str("", Path::new("empty.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.position_interval(), Duration::from_millis(200));
        assert!(config.auto_reset_primary);
        assert_eq!(config.command_thread_nice, Some(-10));
    }

    #[test]
    fn test_partial_file_overrides() {
        let toml = r#"
            position_interval_ms = 50
            auto_reset_primary = false
            output_device = "USB Audio"

            [logging]
            level = "debug"
        "#;
        let config = EngineConfig::from_toml_str(toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.position_interval_ms, 50);
        assert!(!config.auto_reset_primary);
        assert_eq!(config.output_device.as_deref(), Some("USB Audio"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.command_thread_nice, Some(-10));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = EngineConfig::from_toml_str("position_interval_ms = 0", Path::new("x.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_error_names_file() {
        let result = EngineConfig::from_toml_str("position_interval_ms = \"fast\"", Path::new("bad.toml"));
        match result {
            Err(Error::ConfigParse { path, .. }) => assert_eq!(path, PathBuf::from("bad.toml")),
            other => panic!("Expected ConfigParse error, got {:?}", other),
        }
    }
}
