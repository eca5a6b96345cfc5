//! Configuration management for the templates checker
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (templates-checker.toml)
//! - Environment variables (TEMPLATES_CHECKER__*)
//!
//! ## Example config file (templates-checker.toml):
//! ```toml
//! [checker]
//! catalog = "types.toml"
//! manifest = "templates.toml"
//! fail_fast = false
//! suggestions = true
//!
//! [output]
//! format = "text"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::check::CheckOptions;

/// Main configuration for the templates checker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Check settings
    #[serde(default)]
    pub checker: CheckSettings,

    /// Report settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckSettings {
    /// Type catalog (TOML or JSON)
    #[serde(default = "default_catalog")]
    pub catalog: PathBuf,

    /// Template manifest
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Stop at the first template that cannot be checked
    #[serde(default)]
    pub fail_fast: bool,

    /// Suggest similarly named fields for missing ones
    #[serde(default = "default_true")]
    pub suggestions: bool,
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn default_catalog() -> PathBuf {
    PathBuf::from("types.toml")
}

fn default_manifest() -> PathBuf {
    PathBuf::from("templates.toml")
}

fn default_true() -> bool {
    true
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            catalog: default_catalog(),
            manifest: default_manifest(),
            fail_fast: false,
            suggestions: true,
        }
    }
}

impl CheckerConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, with an extra file that must exist
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "templates-checker.toml",
            ".templates-checker.toml",
            "config/templates-checker.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "templates", "templates-checker") {
            let xdg_config = config_dir.config_dir().join("templates-checker.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // TEMPLATES_CHECKER__CHECKER__FAIL_FAST=true
        builder = builder.add_source(
            Environment::with_prefix("TEMPLATES_CHECKER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    pub fn check_options(&self) -> CheckOptions {
        CheckOptions {
            fail_fast: self.checker.fail_fast,
            suggestions: self.checker.suggestions,
        }
    }
}
