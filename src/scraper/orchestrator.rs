use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::app::{DreaderError, Result};
use crate::browser::{
    evaluate_as, BrowserDriver, BrowserLauncher, LocatorRole, Locators, PageScripts,
};
use crate::domain::{Channel, ScrapeJob, Server, StopMode};
use crate::scraper::controller::{FailureAction, JobController, RetryPolicy};
use crate::scraper::extractor::{ExtractedBatch, MessageExtractor, Snapshot};
use crate::scraper::scroller::MessageScroller;
use crate::scraper::ScrapeConfig;
use crate::store::Store;

/// A channel to archive.
#[derive(Debug, Clone)]
pub struct ScrapeTarget {
    pub server: Server,
    pub channel: Channel,
    /// Overrides the configured channel URL template
    pub url: Option<String>,
}

impl ScrapeTarget {
    pub fn new(server: Server, channel: Channel) -> Self {
        Self {
            server,
            channel,
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

const NO_STOP: u8 = 0;
const PAUSE: u8 = 1;
const CANCEL: u8 = 2;

/// Cooperative stop request for a running scrape, checked between cycles.
///
/// A cancel request overrides an earlier pause.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
    mode: Arc<AtomicU8>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.request(PAUSE);
    }

    pub fn cancel(&self) {
        self.request(CANCEL);
    }

    fn request(&self, mode: u8) {
        self.mode.fetch_max(mode, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn requested(&self) -> Option<StopMode> {
        match self.mode.load(Ordering::SeqCst) {
            NO_STOP => None,
            PAUSE => Some(StopMode::Pause),
            _ => Some(StopMode::Cancel),
        }
    }

    /// Resolves once any stop has been requested.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    TopOfHistory,
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Completed(Completion),
    Stopped(StopMode),
    CycleLimit,
}

/// Runs scrape jobs: one browser session and one job per run.
pub struct ScrapeOrchestrator<S: Store> {
    store: Arc<S>,
    launcher: Arc<dyn BrowserLauncher>,
    config: ScrapeConfig,
    locators: Locators,
    scripts: PageScripts,
}

impl<S: Store> ScrapeOrchestrator<S> {
    pub fn new(
        store: Arc<S>,
        launcher: Arc<dyn BrowserLauncher>,
        config: ScrapeConfig,
        locators: Locators,
    ) -> Self {
        let scripts = PageScripts::new(&locators);
        Self {
            store,
            launcher,
            config,
            locators,
            scripts,
        }
    }

    /// Archive a channel, newest messages first, until the top of history.
    ///
    /// Returns `Err` only when the job could not be started (for example a
    /// [`DreaderError::JobConflict`]) or its final state could not be
    /// written. Every other failure ends in a `failed` job.
    pub async fn run(&self, target: &ScrapeTarget, stop: &StopSignal) -> Result<ScrapeJob> {
        self.store.upsert_server(&target.server)?;
        self.store.upsert_channel(&target.channel)?;

        let mut controller = JobController::start(
            self.store.clone(),
            &target.channel.id,
            RetryPolicy::from_config(&self.config),
        )?;

        let url = target.url.clone().unwrap_or_else(|| {
            self.config
                .channel_url(&target.server.id, &target.channel.id)
        });

        let driver = match self.launcher.open().await {
            Ok(driver) => driver,
            Err(err) => {
                error!(job_id = controller.id(), error = %err, "Failed to open browser session");
                return controller.fail(&err, None);
            }
        };

        let outcome = self
            .drive(&mut controller, driver.as_ref(), target, &url, stop)
            .await;

        match outcome {
            Ok(outcome) => {
                self.close(driver.as_ref()).await;
                match outcome {
                    RunOutcome::Completed(reason) => {
                        debug!(job_id = controller.id(), ?reason, "History exhausted");
                        controller.complete()
                    }
                    RunOutcome::Stopped(mode) => controller.stop(mode),
                    RunOutcome::CycleLimit => {
                        warn!(
                            job_id = controller.id(),
                            max_cycles = self.config.max_cycles,
                            "Cycle limit reached, pausing job"
                        );
                        controller.stop(StopMode::Pause)
                    }
                }
            }
            Err(err) => {
                let screenshot = self
                    .capture_diagnostics(driver.as_ref(), controller.id(), &err)
                    .await;
                self.close(driver.as_ref()).await;
                controller.fail(&err, screenshot)
            }
        }
    }

    async fn drive(
        &self,
        controller: &mut JobController<S>,
        driver: &dyn BrowserDriver,
        target: &ScrapeTarget,
        url: &str,
        stop: &StopSignal,
    ) -> Result<RunOutcome> {
        let mut scroller = MessageScroller::new(
            driver,
            &self.scripts,
            &self.locators.message_item,
            self.config.settle_delay(),
        );
        let extractor = MessageExtractor::new(target.channel.id.clone());
        let mut seen = HashSet::new();

        loop {
            info!(job_id = controller.id(), url, "Opening channel");
            match driver.navigate(url).await {
                Ok(()) => break,
                Err(err) => {
                    if !self.retry_after(controller, err, stop).await? {
                        return Ok(Self::stopped(stop));
                    }
                }
            }
        }
        controller.reset_failures();

        // A fresh load shows the newest messages; archive them before scrolling
        let Some(batch) = self
            .capture_with_retry(controller, &scroller, &extractor, target, url, stop)
            .await?
        else {
            return Ok(Self::stopped(stop));
        };
        self.persist(controller, &batch, &mut seen)?;
        self.ensure_scroller(controller, driver).await?;

        let top_confirmations = self.config.top_confirmations.max(1);
        let stall_cycles = self.config.stall_cycles.max(1);
        let mut run_cycles = 0u32;
        let mut tops = 0u32;
        let mut stalled = 0u32;

        loop {
            if let Some(mode) = stop.requested() {
                return Ok(RunOutcome::Stopped(mode));
            }
            if run_cycles >= self.config.max_cycles {
                return Ok(RunOutcome::CycleLimit);
            }

            run_cycles += 1;
            let cycle = controller.begin_cycle();
            let at_top = scroller.scroll_up().await?;

            let Some(batch) = self
                .capture_with_retry(controller, &scroller, &extractor, target, url, stop)
                .await?
            else {
                return Ok(Self::stopped(stop));
            };
            let fresh = self.persist(controller, &batch, &mut seen)?;

            // An absent container reads as an unchanged offset
            if at_top {
                self.ensure_scroller(controller, driver).await?;
            }

            tops = if at_top { tops + 1 } else { 0 };
            stalled = if fresh == 0 { stalled + 1 } else { 0 };

            debug!(
                job_id = controller.id(),
                cycle,
                at_top,
                fresh,
                skipped = batch.skipped,
                position = ?scroller.last_position(),
                "Cycle finished"
            );

            if tops >= top_confirmations {
                return Ok(RunOutcome::Completed(Completion::TopOfHistory));
            }
            if stalled >= stall_cycles {
                info!(
                    job_id = controller.id(),
                    stall_cycles, "No new messages for several cycles, treating as complete"
                );
                return Ok(RunOutcome::Completed(Completion::Stalled));
            }
        }
    }

    fn stopped(stop: &StopSignal) -> RunOutcome {
        RunOutcome::Stopped(stop.requested().unwrap_or(StopMode::Pause))
    }

    /// `Ok(None)` when a stop was requested while backing off.
    async fn capture_with_retry(
        &self,
        controller: &mut JobController<S>,
        scroller: &MessageScroller<'_>,
        extractor: &MessageExtractor,
        target: &ScrapeTarget,
        url: &str,
        stop: &StopSignal,
    ) -> Result<Option<ExtractedBatch>> {
        loop {
            match self.capture(scroller, extractor, target, url).await {
                Ok(batch) => return Ok(Some(batch)),
                Err(err) => {
                    if !self.retry_after(controller, err, stop).await? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn capture(
        &self,
        scroller: &MessageScroller<'_>,
        extractor: &MessageExtractor,
        target: &ScrapeTarget,
        url: &str,
    ) -> Result<ExtractedBatch> {
        if let Err(err) = scroller
            .wait_for_messages(self.config.selector_timeout())
            .await
        {
            return Err(match err {
                DreaderError::SelectorTimeout { .. } => {
                    self.classify_timeout(scroller.driver(), target, url, err)
                        .await
                }
                other => other,
            });
        }

        let snapshot: Snapshot = evaluate_as(scroller.driver(), &self.scripts.snapshot)
            .await
            .map_err(|err| match err {
                DreaderError::Json(e) => DreaderError::Snapshot(e.to_string()),
                other => other,
            })?;

        Ok(extractor.extract(&snapshot))
    }

    /// A selector timeout is only transient if the page is still the
    /// channel view with its scroller rendered.
    async fn classify_timeout(
        &self,
        driver: &dyn BrowserDriver,
        target: &ScrapeTarget,
        expected: &str,
        err: DreaderError,
    ) -> DreaderError {
        let Ok(url) = driver.current_url().await else {
            return err;
        };

        let login_path = self.config.login_path.as_str();
        if !login_path.is_empty() && url.contains(login_path) {
            return DreaderError::SessionInvalidated { url };
        }

        if !url.is_empty() && !url.contains(target.channel.id.as_str()) {
            let title = driver.title().await.unwrap_or_default();
            return DreaderError::WrongView {
                expected: expected.to_string(),
                url,
                title,
            };
        }

        match self.scroller_present(driver).await {
            Some(false) => self.scroller_missing(),
            _ => err,
        }
    }

    /// `None` when the page could not be asked.
    async fn scroller_present(&self, driver: &dyn BrowserDriver) -> Option<bool> {
        let scroller = self.locators.selector(LocatorRole::Scroller);
        evaluate_as::<u64>(driver, &PageScripts::element_count(scroller))
            .await
            .ok()
            .map(|count| count > 0)
    }

    fn scroller_missing(&self) -> DreaderError {
        DreaderError::SelectorMissing {
            role: LocatorRole::Scroller.to_string(),
            selector: self.locators.selector(LocatorRole::Scroller).to_string(),
        }
    }

    /// Fail the job when messages render but the scroll container does not:
    /// without it every scroll looks like the top of history.
    async fn ensure_scroller(
        &self,
        controller: &mut JobController<S>,
        driver: &dyn BrowserDriver,
    ) -> Result<()> {
        if self.scroller_present(driver).await == Some(false) {
            let err = self.scroller_missing();
            controller.on_failure(&err)?;
            return Err(err);
        }
        Ok(())
    }

    /// Count a failure; sleep out the backoff if it is retryable.
    ///
    /// `Ok(true)` means try again, `Ok(false)` that a stop arrived while
    /// waiting, and `Err` hands back the error that ends the job.
    async fn retry_after(
        &self,
        controller: &mut JobController<S>,
        err: DreaderError,
        stop: &StopSignal,
    ) -> Result<bool> {
        match controller.on_failure(&err)? {
            FailureAction::Retry { attempt, delay } => {
                warn!(
                    job_id = controller.id(),
                    attempt,
                    max_attempts = self.config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => Ok(true),
                    _ = stop.stopped() => Ok(false),
                }
            }
            FailureAction::GiveUp => Err(err),
        }
    }

    /// Upsert a batch and advance the job. Returns how many messages were
    /// new to this run.
    fn persist(
        &self,
        controller: &mut JobController<S>,
        batch: &ExtractedBatch,
        seen: &mut HashSet<String>,
    ) -> Result<usize> {
        let mut inserted = 0;
        if !batch.is_empty() {
            let stats = self.store.upsert_messages(&batch.messages)?;
            debug!(
                job_id = controller.id(),
                inserted = stats.inserted,
                updated = stats.updated,
                unchanged = stats.unchanged,
                "Persisted batch"
            );
            inserted = stats.inserted;
        }

        let fresh = batch
            .messages
            .iter()
            .filter(|m| seen.insert(m.message_id.clone()))
            .count();

        controller.advance(batch.oldest().as_ref(), inserted)?;
        controller.reset_failures();
        Ok(fresh)
    }

    /// Best-effort screenshot and page state for a failed job.
    async fn capture_diagnostics(
        &self,
        driver: &dyn BrowserDriver,
        job_id: i64,
        err: &DreaderError,
    ) -> Option<String> {
        let url = driver.current_url().await.unwrap_or_default();
        let title = driver.title().await.unwrap_or_default();

        let path = self.config.diagnostics_dir.join(format!(
            "debug-screenshot-{}.png",
            Utc::now().timestamp_millis()
        ));
        let screenshot = match driver.screenshot(&path).await {
            Ok(()) => Some(path.display().to_string()),
            Err(e) => {
                warn!(job_id, error = %e, "Failed to capture diagnostic screenshot");
                None
            }
        };

        error!(
            job_id,
            kind = %err.kind(),
            url = %url,
            title = %title,
            screenshot = ?screenshot,
            error = %err,
            "Scrape failed"
        );
        screenshot
    }

    async fn close(&self, driver: &dyn BrowserDriver) {
        if let Err(e) = driver.close().await {
            warn!(error = %e, "Failed to close browser session");
        }
    }
}
