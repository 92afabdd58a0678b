use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "relay.toml";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_MODEL: &str = "gpt-oss";
const DEFAULT_CONF_DIR_NAME: &str = ".pixy";
const LOG_FILE_NAME: &str = "relay.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path} failed: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse {path} failed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    /// File logging target; stderr only when unset.
    pub file_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub log: LogConfig,
    /// Stamped on aggregates the relay synthesizes itself.
    pub model: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RelayTomlFile {
    #[serde(default)]
    log: RelayTomlLog,
    #[serde(default)]
    relay: RelayTomlRelay,
    #[serde(default)]
    env: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct RelayTomlLog {
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RelayTomlRelay {
    #[serde(default)]
    model: Option<String>,
}

pub fn resolve_conf_dir(conf_dir: Option<&Path>) -> PathBuf {
    conf_dir
        .map(resolve_conf_dir_arg)
        .unwrap_or_else(|| home_dir().join(DEFAULT_CONF_DIR_NAME))
}

fn resolve_conf_dir_arg(path: &Path) -> PathBuf {
    let expanded = expand_home_path(&path.to_string_lossy());
    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(expanded)
    }
}

fn expand_home_path(path: &str) -> PathBuf {
    let trimmed = path.trim();
    if trimmed == "~" {
        return home_dir();
    }
    if let Some(suffix) = trimmed.strip_prefix("~/") {
        return home_dir().join(suffix);
    }
    PathBuf::from(trimmed)
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Loads `relay.toml` from `conf_dir`. A missing file yields defaults.
pub fn load_relay_config(conf_dir: &Path) -> Result<RelayConfig, ConfigError> {
    let path = conf_dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(RelayConfig::default());
    }
    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    parse_relay_config(&content).map_err(|source| ConfigError::Parse { path, source })
}

pub fn parse_relay_config(content: &str) -> Result<RelayConfig, toml::de::Error> {
    let parsed: RelayTomlFile = toml::from_str(content)?;
    let level = parsed
        .log
        .level
        .as_deref()
        .and_then(|value| resolve_config_value(value, &parsed.env))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    let file_path = parsed
        .log
        .path
        .as_deref()
        .and_then(|value| resolve_config_value(value, &parsed.env))
        .map(|value| expand_home_path(&value).join(LOG_FILE_NAME));
    let model = parsed
        .relay
        .model
        .as_deref()
        .and_then(|value| resolve_config_value(value, &parsed.env))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    Ok(RelayConfig {
        log: LogConfig { level, file_path },
        model,
    })
}

/// `$NAME` reads from the `[env]` table first, then the process
/// environment. Blank values resolve to nothing.
fn resolve_config_value(value: &str, env_map: &HashMap<String, String>) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(env_key) = trimmed.strip_prefix('$') {
        return env_map
            .get(env_key)
            .cloned()
            .or_else(|| std::env::var(env_key).ok())
            .map(|resolved| resolved.trim().to_string())
            .filter(|resolved| !resolved.is_empty());
    }
    Some(trimmed.to_string())
}
