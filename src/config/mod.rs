//! Configuration management for dreader.
//!
//! Configuration is read from `~/.config/dreader/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use crate::browser::Locators;
use crate::logging::LoggingConfig;
use crate::scraper::ScrapeConfig;
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scraper: ScrapeConfig,
    pub locators: Locators,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// If the config file exists but is invalid, returns an error.
    /// Missing fields in the config file will use default values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, creating it if missing.
    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Get the default config file path: `~/.config/dreader/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("dreader").join("config.toml"))
    }

    /// Create a default config file with comments.
    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# dreader configuration
#
# Every key is optional; anything left out uses the default shown here.

[scraper]
# Run the browser without a visible window
headless = true

# Browser profile directory that is already logged in to the web client.
# dreader never logs in by itself.
# profile_dir = "/home/me/.config/dreader/profile"

# Channel page URL; {server_id} and {channel_id} are substituted
channel_url_template = "https://discord.com/channels/{server_id}/{channel_id}"

# A page URL containing this path means the session was logged out
login_path = "/login"

# Page load timeout in seconds
navigation_timeout_secs = 30

# Wait after each scroll for older messages to render (milliseconds)
settle_delay_ms = 1500

# Bounded wait for message elements (milliseconds)
selector_timeout_ms = 10000
selector_poll_ms = 250

# Safety bound on scroll cycles per run; a job that hits it is paused
max_cycles = 5000

# Consecutive unchanged scroll offsets needed to accept top of history
top_confirmations = 2

# Cycles in a row without unseen messages before a job is considered done
stall_cycles = 5

# Transient failures (timeouts, navigation hiccups) are retried with
# exponential backoff up to this many consecutive attempts
max_attempts = 3
backoff_base_ms = 1000
backoff_max_ms = 30000

# Failure screenshots are written here
diagnostics_dir = "data/diagnostics"

[locators]
# CSS selectors for each element the scraper reads. The web client uses
# hashed class names, so these match on class-name fragments. Adjust them
# here when the client's markup changes.
scroller = '[class*="scrollerInner"]'
message_item = 'li[id^="chat-messages-"]'
author = 'h3 [class*="username"]'
author_avatar = 'img[class*="avatar"]'
timestamp = 'time[datetime]'
edited_timestamp = '[class*="edited"] time[datetime]'
content = '[id^="message-content-"]'
attachment = 'a[class*="originalLink"], a[class*="fileNameLink"]'
thread_link = '[class*="threadMessageAccessory"] a[href*="/channels/"]'

[logging]
# trace, debug, info, warn, error; DREADER_LOG or RUST_LOG take precedence
level = "info"

# Also write JSON lines to a daily log file
file = true

# Defaults to the platform data directory (e.g. ~/.local/share/dreader/logs)
# dir = "/var/log/dreader"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
