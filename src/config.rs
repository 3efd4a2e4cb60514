//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$TAGVIEW_CONFIG` (environment variable)
//! 2. `~/.config/tagview/config.toml` (Linux/macOS)
//!    `%APPDATA%\tagview\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::index::mbox::MboxOptions;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub index: IndexConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for header indexes and logs.
    pub cache_dir: Option<PathBuf>,
    /// `strftime` format for dates in listings.
    pub date_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Mbox opened when `--mbox` is not given.
    pub mbox: Option<PathBuf>,
    /// Tag listed by `tagview list` without an argument.
    pub default_tag: String,
    /// Tags of messages that were never tagged.
    pub new_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Render `>` quoting as nested blockquotes in HTML output.
    pub render_quotes: bool,
    /// Drop quoted lines from plain-text output.
    pub strip_citations: bool,
    /// Prefer the HTML body when a message has both.
    pub show_html: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
            date_format: "%Y-%m-%d %H:%M".to_string(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            mbox: None,
            default_tag: "inbox".to_string(),
            new_tags: vec!["inbox".to_string(), "unread".to_string()],
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            render_quotes: true,
            strip_citations: false,
            show_html: false,
        }
    }
}

impl Config {
    /// Options for opening the configured mbox back end.
    pub fn mbox_options(&self, rebuild: bool) -> MboxOptions {
        MboxOptions {
            new_tags: self.index.new_tags.clone(),
            rebuild,
            cache_dir: Some(cache_dir(self)),
        }
    }
}

/// Load configuration from the standard location.
///
/// Returns the defaults if no file is found or it cannot be parsed.
pub fn load_config() -> Config {
    let Some(path) = config_file_path() else {
        return Config::default();
    };
    if !path.exists() {
        return Config::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Config file path: `$TAGVIEW_CONFIG`, then the platform config dir.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("TAGVIEW_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("tagview").join("config.toml"))
}

/// Directory for fallback header indexes and logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tagview")
}
