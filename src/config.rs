//! Configuration module for watchplus.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.watchplus/settings.toml`, searched upward)
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `WP_` and use double underscores
//! to separate nested levels:
//! - `WP_OBSERVER__POLL_GRAIN_MS=250` sets `observer.poll_grain_ms`
//! - `WP_HANDLER__FILTER_DIR_MODIFIED=true` sets `handler.filter_dir_modified`
//! - `WP_SERVICE__PID_DISCOVERY=process-table` sets `service.pid_discovery`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::events::HandlerConfig;
use crate::manager::ObserverSettings;
use crate::observer::EngineConfig;
use crate::service::ServiceSettings;

/// Directory holding the settings file.
pub const CONFIG_DIR: &str = ".watchplus";

/// Settings file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observer manager settings
    #[serde(default)]
    pub observer: ObserverSettings,

    /// Options bound to every handler
    #[serde(default)]
    pub handler: HandlerConfig,

    /// Options bound to every engine
    #[serde(default)]
    pub engine: EngineConfig,

    /// Service manager settings
    #[serde(default)]
    pub service: ServiceSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default level for all modules (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `watchplus::service = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            logging: LoggingConfig::default(),
            observer: ObserverSettings::default(),
            handler: HandlerConfig::default(),
            engine: EngineConfig::default(),
            service: ServiceSettings::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            // Event lines from the log handler stay visible in quiet mode
            modules: HashMap::from([("watchplus::events".to_string(), "info".to_string())]),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores
            // stay part of the field name
            .merge(
                Env::prefixed("WP_").map(|key| key.as_str().to_lowercase().replace("__", ".").into()),
            )
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a `.watchplus` directory
    /// from the current directory up to the root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}
