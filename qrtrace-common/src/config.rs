//! Configuration loading
//!
//! Bootstrap settings come from an optional TOML file. Per-key resolution
//! against CLI arguments and environment variables happens in the scanner
//! crate; this module owns the file format, its location and the compiled
//! defaults.
//!
//! A missing file is not an error (warning + defaults). A file that exists
//! but does not parse is.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Application directory name under the platform config dir
pub const APP_DIR: &str = "qrtrace";

/// Config file name
pub const CONFIG_FILE_NAME: &str = "qrtrace.toml";

/// TOML bootstrap configuration
///
/// Every key is optional so partial files work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Backend base URL, e.g. `https://trace.example.com`
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Lookup path template; `{hash}` is replaced by the canonical hash
    #[serde(default)]
    pub lookup_path: Option<String>,

    /// Camera polling interval in milliseconds
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// HTTP request timeout in seconds
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

/// Built-in defaults used when no other source sets a value
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledDefaults {
    pub api_base_url: String,
    pub lookup_path: String,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Default for CompiledDefaults {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000".to_string(),
            lookup_path: "/api/qr/scan/{hash}".to_string(),
            poll_interval_ms: 100,
            request_timeout_secs: 15,
            log_level: "info".to_string(),
        }
    }
}

impl From<&CompiledDefaults> for TomlConfig {
    fn from(defaults: &CompiledDefaults) -> Self {
        Self {
            api_base_url: Some(defaults.api_base_url.clone()),
            lookup_path: Some(defaults.lookup_path.clone()),
            poll_interval_ms: Some(defaults.poll_interval_ms),
            request_timeout_secs: Some(defaults.request_timeout_secs),
            logging: LoggingConfig {
                level: Some(defaults.log_level.clone()),
            },
        }
    }
}

/// Default config file path for the platform
///
/// `~/.config/qrtrace/qrtrace.toml` on Linux, the platform equivalent
/// elsewhere. `None` if the platform has no config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE_NAME))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the config file if present, defaults otherwise
///
/// An explicit path that does not exist is a configuration error; the
/// implicit platform path is allowed to be missing.
pub fn load_or_default(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        info!("Loading config from {}", path.display());
        return load_toml_config(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            info!("Loading config from {}", path.display());
            load_toml_config(&path)
        }
        Some(path) => {
            warn!(
                "No config file at {}, using built-in defaults",
                path.display()
            );
            Ok(TomlConfig::default())
        }
        None => {
            warn!("Could not determine config directory, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Write a config file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    // Atomic replace
    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
