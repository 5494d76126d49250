//! Runtime settings resolution
//!
//! **Priority:** CLI → ENV → TOML → compiled default, per key.
//!
//! A value set in more than one source is not an error, but it is logged as
//! a warning since it usually means a stale config file or a forgotten
//! export.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use qrtrace_common::config::{CompiledDefaults, TomlConfig};
use qrtrace_common::{Error, Result};
use tracing::{debug, warn};

pub const ENV_API_URL: &str = "QRTRACE_API_URL";
pub const ENV_LOOKUP_PATH: &str = "QRTRACE_LOOKUP_PATH";
pub const ENV_POLL_INTERVAL_MS: &str = "QRTRACE_POLL_INTERVAL_MS";
pub const ENV_LOG_LEVEL: &str = "QRTRACE_LOG_LEVEL";
pub const ENV_TOKEN: &str = "QRTRACE_TOKEN";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_url: Option<String>,
    pub lookup_path: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub log_level: Option<String>,
    pub token: Option<String>,
}

/// Fully resolved scanner settings
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    pub api_base_url: String,
    pub lookup_path: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub log_level: String,
    /// Bearer token for backend calls; CLI or environment only
    pub token: Option<String>,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: Display,
{
    env_value(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{}={:?}: {}", name, raw, e)))
        })
        .transpose()
}

/// Pick the highest-priority value among the tiers
fn resolve_tier<T: Clone>(key: &str, cli: Option<T>, env: Option<T>, toml: Option<T>, default: T) -> T {
    let tiers = [("command line", cli), ("environment", env), ("TOML", toml)];
    let sources: Vec<&str> = tiers
        .iter()
        .filter(|(_, value)| value.is_some())
        .map(|(source, _)| *source)
        .collect();

    if sources.len() > 1 {
        warn!(
            "{} set in multiple sources: {}. Using {} (highest priority).",
            key,
            sources.join(", "),
            sources[0]
        );
    }

    match tiers.into_iter().find_map(|(source, value)| value.map(|v| (source, v))) {
        Some((source, value)) => {
            debug!("{} loaded from {}", key, source);
            value
        }
        None => default,
    }
}

impl ScanSettings {
    /// Resolve every setting and validate the result
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Result<Self> {
        let defaults = CompiledDefaults::default();

        let api_base_url = resolve_tier(
            "api_base_url",
            cli.api_url.clone(),
            env_value(ENV_API_URL),
            toml.api_base_url.clone(),
            defaults.api_base_url,
        );
        let lookup_path = resolve_tier(
            "lookup_path",
            cli.lookup_path.clone(),
            env_value(ENV_LOOKUP_PATH),
            toml.lookup_path.clone(),
            defaults.lookup_path,
        );
        let poll_interval_ms = resolve_tier(
            "poll_interval_ms",
            cli.poll_interval_ms,
            env_parsed::<u64>(ENV_POLL_INTERVAL_MS)?,
            toml.poll_interval_ms,
            defaults.poll_interval_ms,
        );
        let request_timeout_secs = toml
            .request_timeout_secs
            .unwrap_or(defaults.request_timeout_secs);
        let log_level = resolve_tier(
            "log_level",
            cli.log_level.clone(),
            env_value(ENV_LOG_LEVEL),
            toml.logging.level.clone(),
            defaults.log_level,
        )
        .to_ascii_lowercase();
        let token = cli.token.clone().or_else(|| env_value(ENV_TOKEN));

        if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "api_base_url must be an http(s) URL, got {:?}",
                api_base_url
            )));
        }
        if poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be greater than 0".to_string()));
        }
        if request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(Error::Config(format!(
                "log level must be one of {}, got {:?}",
                LOG_LEVELS.join(", "),
                log_level
            )));
        }

        Ok(Self {
            api_base_url,
            lookup_path,
            poll_interval: Duration::from_millis(poll_interval_ms),
            request_timeout: Duration::from_secs(request_timeout_secs),
            log_level,
            token,
        })
    }
}
