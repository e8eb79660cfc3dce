//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILBOUNCE_CONFIG` (environment variable)
//! 2. `~/.config/mailbounce/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailbounce\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{MailError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Site-wide mail settings.
    pub site: SiteConfig,
    /// Analyzer plugins; run in ascending weight order.
    pub analyzers: Vec<PluginConfig>,
    /// Handler plugins; run in the order listed.
    pub handlers: Vec<PluginConfig>,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Deliverer id attached to messages processed from the command line.
    pub deliverer: String,
}

/// Site-wide mail settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Envelope sender of outgoing mail, e.g. `bounces@example.com`.
    /// VERP addresses are built from it.
    pub return_path: String,
}

/// One configured analyzer or handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Unique id of this configuration.
    pub id: String,
    pub label: String,
    /// Registry id of the plugin; defaults to `id`.
    pub plugin: String,
    pub enabled: bool,
    /// Analyzers only: lower runs earlier.
    pub weight: i32,
    /// Plugin-specific settings.
    pub configuration: toml::Table,
}

impl PluginConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_setting(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.configuration.insert(key.to_string(), value.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The registry id to instantiate.
    pub fn plugin_id(&self) -> &str {
        if self.plugin.is_empty() {
            &self.id
        } else {
            &self.plugin
        }
    }

    /// Deserialize `configuration` into the plugin's own settings type.
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T> {
        toml::Value::Table(self.configuration.clone())
            .try_into()
            .map_err(|e: toml::de::Error| MailError::PluginConfig {
                id: self.id.clone(),
                reason: e.message().to_string(),
            })
    }
}

// ── Default implementations ─────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            site: SiteConfig::default(),
            analyzers: vec![
                PluginConfig::new("verp").with_weight(-10),
                PluginConfig::new("dsn"),
                PluginConfig::new("dsn_reason"),
                PluginConfig::new("sender").with_weight(10),
            ],
            handlers: vec![
                PluginConfig::new("moderator_forward"),
                PluginConfig::new("mailmute"),
            ],
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
            deliverer: "cli".to_string(),
        }
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            label: String::new(),
            plugin: String::new(),
            enabled: true,
            weight: 0,
            configuration: toml::Table::new(),
        }
    }
}

impl Config {
    /// Enabled analyzers, stably sorted by ascending weight.
    pub fn enabled_analyzers(&self) -> Vec<&PluginConfig> {
        let mut analyzers: Vec<_> = self.analyzers.iter().filter(|a| a.enabled).collect();
        analyzers.sort_by_key(|a| a.weight);
        analyzers
    }

    /// Enabled handlers in configured order.
    pub fn enabled_handlers(&self) -> Vec<&PluginConfig> {
        self.handlers.iter().filter(|h| h.enabled).collect()
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILBOUNCE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailbounce").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailbounce")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailbounce.log")
}
