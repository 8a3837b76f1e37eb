use std::time::Duration;

use tracing::debug;

use crate::app::Result;
use crate::browser::{evaluate_as, BrowserDriver, PageScripts};

/// Scrolls a channel's message pane upward and detects the top of history.
///
/// Top detection compares the scroll offset before and after a scroll
/// request: at the real top the request is a no-op, so the two samples are
/// equal. That needs no knowledge of the total scrollable height, which
/// keeps changing as older messages load.
pub struct MessageScroller<'a> {
    driver: &'a dyn BrowserDriver,
    scripts: &'a PageScripts,
    message_selector: &'a str,
    settle_delay: Duration,
    last_position: Option<f64>,
}

impl<'a> MessageScroller<'a> {
    pub fn new(
        driver: &'a dyn BrowserDriver,
        scripts: &'a PageScripts,
        message_selector: &'a str,
        settle_delay: Duration,
    ) -> Self {
        Self {
            driver,
            scripts,
            message_selector,
            settle_delay,
            last_position: None,
        }
    }

    /// Scroll up one viewport; returns true when the offset did not move.
    pub async fn scroll_up(&mut self) -> Result<bool> {
        let before = self.current_scroll_position().await?;

        self.driver.evaluate(&self.scripts.scroll_up).await?;

        // The client renders older messages asynchronously after a scroll
        tokio::time::sleep(self.settle_delay).await;

        let after = self.current_scroll_position().await?;
        self.last_position = Some(after);

        let at_top = before == after;
        debug!(before, after, at_top, "Scrolled up");
        Ok(at_top)
    }

    /// Scroll offset of the message pane; 0 while the pane is not rendered.
    pub async fn current_scroll_position(&self) -> Result<f64> {
        let position: Option<f64> =
            evaluate_as(self.driver, &self.scripts.scroll_position).await?;
        Ok(position.unwrap_or(0.0))
    }

    pub fn driver(&self) -> &'a dyn BrowserDriver {
        self.driver
    }

    /// Offset observed after the most recent scroll.
    pub fn last_position(&self) -> Option<f64> {
        self.last_position
    }

    /// Jump to the newest messages. Only needed for full-history runs that
    /// do not start from a freshly loaded channel view.
    pub async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.driver.evaluate(&self.scripts.scroll_to_bottom).await?;
        tokio::time::sleep(self.settle_delay).await;
        self.last_position = Some(self.current_scroll_position().await?);
        Ok(())
    }

    /// Wait for rendered message elements.
    pub async fn wait_for_messages(&self, timeout: Duration) -> Result<()> {
        self.driver
            .wait_for_selector(self.message_selector, timeout)
            .await
    }
}
