//! Configuration management for bookfetch.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::book::DEFAULT_MIN_CHAPTER_CHARS;
use crate::error::ConfigError;
use crate::requester::Strategy;
use crate::sources::{ProfileConfig, Site};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Application name used for config directory.
const APP_NAME: &str = "bookfetch";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Default browser user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fetch strategy and retry budget.
    pub requester: RequesterConfig,

    /// HTTP session settings shared by every source.
    pub session: SessionConfig,

    /// Where and how books are written.
    pub output: OutputConfig,

    /// User-defined site profiles, keyed by site name.
    pub profiles: BTreeMap<String, ProfileConfig>,
}

/// Requester behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequesterConfig {
    /// Which fetch strategy to run.
    pub strategy: Strategy,

    /// Rounds without progress before the concurrent strategy gives up.
    pub stall_limit: u32,

    /// Insert a newline between pages of one chapter.
    pub add_enter: bool,

    /// Attempts per chapter for the sequential catalogue strategy.
    pub attempts_per_chapter: u32,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::Concurrent,
            stall_limit: 20,
            add_enter: false,
            attempts_per_chapter: 3,
        }
    }
}

/// HTTP session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// User-Agent header.
    pub user_agent: String,

    /// Raw cookie header, e.g. `"a=1; b=2"`.
    pub cookie: Option<String>,

    /// Netscape cookie file loaded into the session's cookie jar.
    pub cookie_file: Option<PathBuf>,

    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,

    /// Per-request timeout in seconds.
    pub timeout_sec: f64,

    /// Delay before each request in seconds.
    pub delay_between_requests_sec: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cookie: None,
            cookie_file: None,
            headers: BTreeMap::new(),
            timeout_sec: 30.0,
            delay_between_requests_sec: 0.0,
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for written books.
    pub output_directory: PathBuf,

    /// File name template; `{author}` and `{name}` are substituted.
    pub filename_format: String,

    /// Chapters shorter than this are reported as possibly invalid.
    pub min_chapter_chars: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("."),
            filename_format: "【{author}】{name}.txt".to_string(),
            min_chapter_chars: DEFAULT_MIN_CHAPTER_CHARS,
        }
    }
}

impl OutputConfig {
    /// Output path for a book with the given metadata.
    pub fn book_path(&self, name: &str, author: &str) -> PathBuf {
        let file_name = self
            .filename_format
            .replace("{author}", author)
            .replace("{name}", name)
            .replace(['/', '\\'], "_");
        self.output_directory.join(file_name)
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requester.stall_limit == 0 {
            return Err(invalid("requester.stall_limit", "must be greater than 0"));
        }

        if self.requester.attempts_per_chapter == 0 {
            return Err(invalid(
                "requester.attempts_per_chapter",
                "must be greater than 0",
            ));
        }

        let timeout = self.session.timeout_sec;
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(invalid(
                "session.timeout_sec",
                "must be a finite number greater than 0",
            ));
        }

        let delay = self.session.delay_between_requests_sec;
        if !delay.is_finite() || delay < 0.0 {
            return Err(invalid(
                "session.delay_between_requests_sec",
                "must be a finite, non-negative number",
            ));
        }

        for (name, profile) in &self.profiles {
            let key = format!("profiles.{name}");
            if Site::from_name(name).is_some() {
                return Err(invalid(&key, "shadows a built-in site"));
            }
            profile
                .validate()
                .map_err(|e| invalid(&key, &e.to_string()))?;
        }

        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
