use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the scrape engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Whether to run the browser in headless mode (default: true)
    pub headless: bool,

    /// Pre-authenticated browser profile directory
    pub profile_dir: Option<PathBuf>,

    /// User agent string to use
    pub user_agent: Option<String>,

    /// Channel page URL; `{server_id}` and `{channel_id}` are substituted
    pub channel_url_template: String,

    /// Path fragment that means the session was logged out
    pub login_path: String,

    /// Page load timeout in seconds (default: 30)
    pub navigation_timeout_secs: u64,

    /// Wait after each scroll for lazily rendered messages, in milliseconds (default: 1500)
    pub settle_delay_ms: u64,

    /// Bounded wait for message elements, in milliseconds (default: 10000)
    pub selector_timeout_ms: u64,

    /// How often a selector wait re-checks the page, in milliseconds (default: 250)
    pub selector_poll_ms: u64,

    /// Safety bound on scroll cycles per run (default: 5000)
    pub max_cycles: u32,

    /// Consecutive unchanged scroll samples required to accept top of history (default: 2)
    pub top_confirmations: u32,

    /// Consecutive cycles without unseen messages before declaring completion (default: 5)
    pub stall_cycles: u32,

    /// Consecutive transient failures tolerated before a job fails (default: 3)
    pub max_attempts: u32,

    /// First retry delay in milliseconds; doubles per failure (default: 1000)
    pub backoff_base_ms: u64,

    /// Upper bound on a single retry delay in milliseconds (default: 30000)
    pub backoff_max_ms: u64,

    /// Where failure screenshots are written
    pub diagnostics_dir: PathBuf,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            headless: true,
            profile_dir: None,
            user_agent: None,
            channel_url_template: "https://discord.com/channels/{server_id}/{channel_id}"
                .to_string(),
            login_path: "/login".to_string(),
            navigation_timeout_secs: 30,
            settle_delay_ms: 1500,
            selector_timeout_ms: 10_000,
            selector_poll_ms: 250,
            max_cycles: 5000,
            top_confirmations: 2,
            stall_cycles: 5,
            max_attempts: 3,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
            diagnostics_dir: PathBuf::from("data/diagnostics"),
        }
    }
}

impl ScrapeConfig {
    /// Get the page load timeout as a Duration
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    /// Get the post-scroll settle delay as a Duration
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Get the selector wait timeout as a Duration
    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    pub fn selector_poll_interval(&self) -> Duration {
        Duration::from_millis(self.selector_poll_ms.max(1))
    }

    /// Build the page URL for a channel
    pub fn channel_url(&self, server_id: &str, channel_id: &str) -> String {
        self.channel_url_template
            .replace("{server_id}", server_id)
            .replace("{channel_id}", channel_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = ScrapeConfig::default();
        assert!(config.headless);
        assert_eq!(config.settle_delay_ms, 1500);
        assert_eq!(config.selector_timeout_ms, 10_000);
        assert_eq!(config.top_confirmations, 2);
        assert_eq!(config.max_attempts, 3);
        assert!(config.profile_dir.is_none());
    }

    #[test]
    fn test_durations() {
        let config = ScrapeConfig::default();
        assert_eq!(config.selector_timeout(), Duration::from_secs(10));
        assert_eq!(config.selector_poll_interval(), Duration::from_millis(250));

        let zero = ScrapeConfig {
            selector_poll_ms: 0,
            ..Default::default()
        };
        assert_eq!(zero.selector_poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_channel_url() {
        let config = ScrapeConfig::default();
        assert_eq!(
            config.channel_url("111", "222"),
            "https://discord.com/channels/111/222"
        );
    }
}
