//! Browser capability layer.
//!
//! The scrape engine only talks to a page through [`BrowserDriver`], so the
//! automation technology behind it is swappable. [`ChromeDriver`] is the
//! chromiumoxide-backed implementation; tests use a scripted fake.
//!
//! ```rust,ignore
//! use dreader::browser::{BrowserLauncher, ChromeLauncher};
//!
//! let launcher = ChromeLauncher::new(config);
//! let driver = launcher.open().await?;
//! driver.navigate("https://discord.com/channels/1/2").await?;
//! let offset: f64 = evaluate_as(driver.as_ref(), &scripts.scroll_position).await?;
//! ```

mod chrome;
pub mod locators;
pub mod scripts;

#[cfg(test)]
pub(crate) mod fake;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::app::Result;

pub use chrome::{ChromeDriver, ChromeLauncher};
pub use locators::{LocatorRole, Locators};
pub use scripts::PageScripts;

/// Capabilities of one controlled browser page
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Evaluate a script in page context and return its JSON value
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Wait until `selector` matches; fails with `SelectorTimeout` otherwise
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    /// Release the page and its browser
    async fn close(&self) -> Result<()>;
}

/// Opens browser sessions; one per scrape job
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserDriver>>;
}

/// Evaluate a script and deserialize its result
pub async fn evaluate_as<T: DeserializeOwned>(
    driver: &dyn BrowserDriver,
    script: &str,
) -> Result<T> {
    let value = driver.evaluate(script).await?;
    Ok(serde_json::from_value(value)?)
}
