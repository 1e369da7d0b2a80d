//! Configuration management for the dyndesk daemon.
//!
//! Configuration is loaded from TOML files in the following locations (in order):
//! 1. `$XDG_CONFIG_HOME/dyndesk/config.toml` (platform standard)
//! 2. `~/.config/dyndesk/config.toml`
//! 3. `./config.toml` (current directory, for development)
//!
//! The daemon re-reads the file before every pass.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use dyndesk_core::{LabelTemplate, ReconcileConfig, DEFAULT_LABEL_TEMPLATE, DEFAULT_MINIMUM_DESKTOPS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Log levels accepted in `behavior.log_level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for dyndesk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Desktop count and naming.
    pub desktops: DesktopsConfig,
    /// Behavior configuration.
    pub behavior: BehaviorConfig,
}

/// Desktop-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopsConfig {
    /// Number of desktops that always exist, occupied or not.
    #[serde(default = "default_minimum_desktops", alias = "minimumDesktops")]
    pub minimum_desktops: i64,

    /// Desktop label; `%n` is replaced by the desktop's 1-based index.
    #[serde(default = "default_label_template", alias = "labelTemplate")]
    pub label_template: String,
}

impl Default for DesktopsConfig {
    fn default() -> Self {
        Self {
            minimum_desktops: default_minimum_desktops(),
            label_template: default_label_template(),
        }
    }
}

/// Behavior-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions for serde
fn default_minimum_desktops() -> i64 {
    DEFAULT_MINIMUM_DESKTOPS as i64
}

fn default_label_template() -> String {
    DEFAULT_LABEL_TEMPLATE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A configuration value that was adjusted during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ConfigWarning {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Clamp out-of-range values in place and report what was changed.
    ///
    /// Invalid values never abort a pass: a minimum below 1 becomes 1, an unknown
    /// log level becomes `info`. A template without `%n` is kept and used literally.
    pub fn validate(&mut self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.desktops.minimum_desktops < 1 {
            warnings.push(ConfigWarning::new(
                "desktops.minimum_desktops",
                format!("{} is below 1, using 1", self.desktops.minimum_desktops),
            ));
            self.desktops.minimum_desktops = 1;
        }

        if !LabelTemplate::new(self.desktops.label_template.as_str()).has_placeholder() {
            warnings.push(ConfigWarning::new(
                "desktops.label_template",
                format!(
                    "\"{}\" has no %n placeholder, every desktop gets the same label",
                    self.desktops.label_template
                ),
            ));
        }

        let level = self.behavior.log_level.to_lowercase();
        if LOG_LEVELS.contains(&level.as_str()) {
            self.behavior.log_level = level;
        } else {
            warnings.push(ConfigWarning::new(
                "behavior.log_level",
                format!("unknown level \"{}\", using info", self.behavior.log_level),
            ));
            self.behavior.log_level = default_log_level();
        }

        warnings
    }

    /// Values the reconciler reads for one pass.
    pub fn reconcile_config(&self) -> ReconcileConfig {
        let minimum = usize::try_from(self.desktops.minimum_desktops).unwrap_or(1);
        ReconcileConfig::new(minimum, self.desktops.label_template.as_str())
    }

    /// Load configuration from standard locations.
    ///
    /// Tries the following locations in order:
    /// 1. `$XDG_CONFIG_HOME/dyndesk/config.toml`
    /// 2. `~/.config/dyndesk/config.toml`
    /// 3. `./config.toml`
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self> {
        match find_config_file() {
            Some(path) => {
                tracing::debug!("Loading config from: {}", path.display());
                Self::load_from_path(&path)
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

/// First existing config file in priority order.
pub fn find_config_file() -> Option<PathBuf> {
    config_paths().into_iter().find(|path| path.exists())
}

/// Get all possible config file paths in priority order.
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. Platform standard: $XDG_CONFIG_HOME/dyndesk/config.toml
    if let Some(proj_dirs) = ProjectDirs::from("", "", "dyndesk") {
        paths.push(proj_dirs.config_dir().join("config.toml"));
    }

    // 2. ~/.config/dyndesk/config.toml, in case XDG_CONFIG_HOME points elsewhere
    if let Some(home) = dirs_home() {
        let path = home.join(".config").join("dyndesk").join("config.toml");
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    // 3. Current directory: ./config.toml
    paths.push(PathBuf::from("config.toml"));

    paths
}

/// Get the user's home directory.
fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}
