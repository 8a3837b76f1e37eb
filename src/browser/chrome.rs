use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::app::{DreaderError, Result};
use crate::browser::{BrowserDriver, BrowserLauncher};
use crate::scraper::ScrapeConfig;

/// Chrome-backed page driver using chromiumoxide
pub struct ChromeDriver {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    poll_interval: Duration,
}

impl ChromeDriver {
    /// Launch a browser on the configured profile and open a blank page
    pub async fn launch(config: &ScrapeConfig) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer")
            .request_timeout(config.navigation_timeout());

        if let Some(ref profile) = config.profile_dir {
            builder = builder.user_data_dir(profile);
        }

        if !config.headless {
            builder = builder.with_head();
        }

        let browser_config = builder
            .build()
            .map_err(|e| DreaderError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
            DreaderError::Browser(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        // Spawn the browser handler
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DreaderError::Browser(format!("Failed to create page: {}", e)))?;

        if let Some(ref ua) = config.user_agent {
            page.set_user_agent(ua)
                .await
                .map_err(|e| DreaderError::Browser(format!("Failed to set user agent: {}", e)))?;
        }

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler,
            poll_interval: config.selector_poll_interval(),
        })
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| DreaderError::Navigation(format!("{}: {}", url, e)))?;

        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| DreaderError::Navigation(format!("{}: {}", url, e)))?;

        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| DreaderError::Browser(format!("Script execution failed: {}", e)))?;

        // `undefined` and `null` both come back without a value
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let poll = async {
            loop {
                if self.page.find_element(selector).await.is_ok() {
                    return;
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| DreaderError::SelectorTimeout {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(|e| DreaderError::Browser(format!("Screenshot failed: {}", e)))?;

        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .map_err(|e| DreaderError::Browser(format!("Failed to read URL: {}", e)))?;
        Ok(url.unwrap_or_default())
    }

    async fn title(&self) -> Result<String> {
        let title = self
            .page
            .get_title()
            .await
            .map_err(|e| DreaderError::Browser(format!("Failed to read title: {}", e)))?;
        Ok(title.unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;

        if let Err(e) = self.page.clone().close().await {
            warn!("Failed to close page: {}", e);
        }

        browser
            .close()
            .await
            .map_err(|e| DreaderError::Browser(format!("Failed to close browser: {}", e)))?;
        let _ = browser.wait().await;
        self.handler.abort();

        Ok(())
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Launches one Chrome session per job
pub struct ChromeLauncher {
    config: ScrapeConfig,
}

impl ChromeLauncher {
    pub fn new(config: ScrapeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn open(&self) -> Result<Box<dyn BrowserDriver>> {
        let driver = ChromeDriver::launch(&self.config).await?;
        Ok(Box::new(driver))
    }
}
