//! Configuration management for the SDJ engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (sdj.toml)
//! - Environment variables (SDJ__*)
//!
//! ## Example config file (sdj.toml):
//! ```toml
//! [logging]
//! mode = "lib"
//! max_logs = 50
//!
//! [description]
//! default_language = "en"
//! data_info = false
//!
//! [validation]
//! strict = true
//! schema_id = "http://willrudolph.com/schemas/sdj-schema.json"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::log::LogMode;
use crate::patterns::{DEFAULT_LANG, SCHEMA_IDS};

/// Main configuration for a host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SdjConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub description: DescriptionConfig,

    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit/store preset
    #[serde(default)]
    pub mode: LogMode,

    /// Overrides the preset's per-module history size
    #[serde(default)]
    pub max_logs: Option<usize>,
}

/// Defaults applied to descriptions that leave them unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionConfig {
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Stamp `sdInfo` on every data node
    #[serde(default)]
    pub data_info: bool,
}

/// Validation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Fail on the first violation instead of logging
    #[serde(default = "default_true")]
    pub strict: bool,

    /// `$id` written on serialized documents
    #[serde(default = "default_schema_id")]
    pub schema_id: String,
}

fn default_language() -> String {
    DEFAULT_LANG.to_string()
}

fn default_true() -> bool {
    true
}

fn default_schema_id() -> String {
    SCHEMA_IDS[0].to_string()
}

impl Default for DescriptionConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            data_info: false,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict: true,
            schema_id: default_schema_id(),
        }
    }
}

impl SdjConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, with an optional explicit file on top
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["sdj.toml", ".sdj.toml", "config/sdj.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("com", "willrudolph", "sdj") {
            let xdg_config = dirs.config_dir().join("sdj.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // SDJ__VALIDATION__STRICT=false
        builder = builder.add_source(
            Environment::with_prefix("SDJ")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Per-module history size after the override
    pub fn max_logs(&self) -> Option<usize> {
        self.logging.max_logs.or_else(|| self.logging.mode.max_logs())
    }
}
