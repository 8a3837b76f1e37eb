//! Scripted browser doubles for tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use crate::app::{DreaderError, Result};
use crate::browser::{BrowserDriver, BrowserLauncher, LocatorRole, Locators, PageScripts};
use crate::scraper::RawMessage;

/// Replays queued `evaluate` results in order and records every call.
pub struct ScriptedDriver {
    results: Mutex<VecDeque<Value>>,
    evaluated: Mutex<Vec<String>>,
    waited: Mutex<Vec<String>>,
}

impl ScriptedDriver {
    pub fn new(results: Vec<Value>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            evaluated: Mutex::new(Vec::new()),
            waited: Mutex::new(Vec::new()),
        }
    }

    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().unwrap().clone()
    }

    pub fn waited(&self) -> Vec<String> {
        self.waited.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn navigate(&self, _url: &str) -> Result<()> {
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.evaluated.lock().unwrap().push(script.to_string());
        Ok(self.results.lock().unwrap().pop_front().unwrap_or(Value::Null))
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<()> {
        self.waited.lock().unwrap().push(selector.to_string());
        Ok(())
    }

    async fn screenshot(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn title(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Channel history: `len` messages a minute apart, a new author header every
/// `group` messages. Ids start at 1000.
pub fn sample_history(len: usize, group: usize) -> Vec<RawMessage> {
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    (0..len)
        .map(|i| {
            let ts = base + chrono::Duration::minutes(i as i64);
            let is_header = i % group.max(1) == 0;
            RawMessage {
                element_id: format!("chat-messages-42-{}", 1000 + i),
                author_name: is_header.then(|| format!("user{}", (i / group.max(1)) % 3)),
                timestamp: Some(ts.to_rfc3339()),
                content: format!("message {}", i),
                ..Default::default()
            }
        })
        .collect()
}

type ScrollHook = Arc<dyn Fn(u32) + Send + Sync>;

struct PageState {
    /// Index of the first rendered message
    start: usize,
    url: String,
    redirect_to: Option<String>,
    scroller_present: bool,
    scroller_vanishes_after: Option<u32>,
    drifting: bool,
    wait_failures: Option<u32>,
    navigation_failures: u32,
    fail_screenshots: bool,
    waits: u32,
    scrolls: u32,
    navigations: u32,
    screenshots: Vec<PathBuf>,
    closed: bool,
    scroll_hook: Option<ScrollHook>,
}

struct PageInner {
    scripts: PageScripts,
    scroller_count: String,
    history: Vec<RawMessage>,
    viewport: usize,
    state: Mutex<PageState>,
}

/// A simulated channel page.
///
/// Renders a window of `viewport` messages out of `history` (oldest first).
/// The scroll offset is 100 per message above the window; scrolling up moves
/// the window by `viewport - 1` so consecutive snapshots overlap by one.
#[derive(Clone)]
pub struct FakeChannelPage {
    inner: Arc<PageInner>,
}

impl FakeChannelPage {
    pub fn new(locators: &Locators, history: Vec<RawMessage>, viewport: usize) -> Self {
        let viewport = viewport.max(2);
        let start = history.len().saturating_sub(viewport);
        Self {
            inner: Arc::new(PageInner {
                scripts: PageScripts::new(locators),
                scroller_count: PageScripts::element_count(locators.selector(LocatorRole::Scroller)),
                history,
                viewport,
                state: Mutex::new(PageState {
                    start,
                    url: "about:blank".to_string(),
                    redirect_to: None,
                    scroller_present: true,
                    scroller_vanishes_after: None,
                    drifting: false,
                    wait_failures: Some(0),
                    navigation_failures: 0,
                    fail_screenshots: false,
                    waits: 0,
                    scrolls: 0,
                    navigations: 0,
                    screenshots: Vec::new(),
                    closed: false,
                    scroll_hook: None,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.inner.state.lock().unwrap()
    }

    /// Every selector wait times out.
    pub fn never_renders(self) -> Self {
        self.state().wait_failures = None;
        self
    }

    /// The first `n` selector waits time out.
    pub fn slow_renders(self, n: u32) -> Self {
        self.state().wait_failures = Some(n);
        self
    }

    pub fn without_scroller(self) -> Self {
        self.state().scroller_present = false;
        self
    }

    /// The scroll container is removed by the `n`th scroll.
    pub fn scroller_vanishes_after(self, n: u32) -> Self {
        self.state().scroller_vanishes_after = Some(n);
        self
    }

    /// The offset keeps changing even when no new content loads.
    pub fn drifting_offsets(self) -> Self {
        self.state().drifting = true;
        self
    }

    pub fn redirect_to(self, url: &str) -> Self {
        self.state().redirect_to = Some(url.to_string());
        self
    }

    pub fn failing_navigations(self, n: u32) -> Self {
        self.state().navigation_failures = n;
        self
    }

    pub fn failing_screenshots(self) -> Self {
        self.state().fail_screenshots = true;
        self
    }

    /// Called with the running scroll count after every scroll.
    pub fn on_scroll(self, hook: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.state().scroll_hook = Some(Arc::new(hook));
        self
    }

    pub fn waits(&self) -> u32 {
        self.state().waits
    }

    pub fn scrolls(&self) -> u32 {
        self.state().scrolls
    }

    pub fn navigations(&self) -> u32 {
        self.state().navigations
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state().screenshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn newest_start(&self) -> usize {
        self.inner.history.len().saturating_sub(self.inner.viewport)
    }

    fn rendered(&self, start: usize) -> Value {
        let end = (start + self.inner.viewport).min(self.inner.history.len());
        serde_json::to_value(&self.inner.history[start..end]).unwrap()
    }
}

#[async_trait]
impl BrowserDriver for FakeChannelPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let newest = self.newest_start();
        let mut state = self.state();
        state.navigations += 1;
        if state.navigation_failures > 0 {
            state.navigation_failures -= 1;
            return Err(DreaderError::Navigation(format!("{}: net::ERR_CONNECTION_RESET", url)));
        }
        state.url = state.redirect_to.clone().unwrap_or_else(|| url.to_string());
        state.start = newest;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let scripts = &self.inner.scripts;
        let newest = self.newest_start();
        let step = self.inner.viewport - 1;

        if script == scripts.scroll_position {
            let state = self.state();
            let offset = match (state.scroller_present, state.drifting) {
                (false, _) => 0,
                (true, false) => state.start * 100,
                (true, true) => state.start * 100 + state.scrolls as usize,
            };
            return Ok(json!(offset));
        }

        if script == scripts.scroll_up {
            let (count, hook) = {
                let mut state = self.state();
                state.start = state.start.saturating_sub(step);
                state.scrolls += 1;
                if state.scroller_vanishes_after == Some(state.scrolls) {
                    state.scroller_present = false;
                }
                (state.scrolls, state.scroll_hook.clone())
            };
            if let Some(hook) = hook {
                hook(count);
            }
            return Ok(Value::Null);
        }

        if script == scripts.scroll_to_bottom {
            self.state().start = newest;
            return Ok(Value::Null);
        }

        if script == scripts.snapshot {
            let start = self.state().start;
            return Ok(self.rendered(start));
        }

        if script == self.inner.scroller_count {
            let present = self.state().scroller_present;
            return Ok(json!(if present { 1 } else { 0 }));
        }

        Err(DreaderError::Browser(format!("unexpected script: {}", script)))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let mut state = self.state();
        state.waits += 1;
        let timed_out = match state.wait_failures {
            None => true,
            Some(0) => false,
            Some(n) => {
                state.wait_failures = Some(n - 1);
                true
            }
        };
        if timed_out {
            return Err(DreaderError::SelectorTimeout {
                selector: selector.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        if self.state().fail_screenshots {
            return Err(DreaderError::Browser("Screenshot failed: target closed".into()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"\x89PNG\r\n")?;
        self.state().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state().url.clone())
    }

    async fn title(&self) -> Result<String> {
        Ok("#general | Test Server".to_string())
    }

    async fn close(&self) -> Result<()> {
        self.state().closed = true;
        Ok(())
    }
}

/// Hands out the same fake page for every session.
pub struct FakeLauncher {
    page: Option<FakeChannelPage>,
    opened: AtomicU32,
}

impl FakeLauncher {
    pub fn new(page: FakeChannelPage) -> Self {
        Self {
            page: Some(page),
            opened: AtomicU32::new(0),
        }
    }

    /// A launcher whose browser never starts.
    pub fn broken() -> Self {
        Self {
            page: None,
            opened: AtomicU32::new(0),
        }
    }

    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn open(&self) -> Result<Box<dyn BrowserDriver>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        match &self.page {
            Some(page) => Ok(Box::new(page.clone())),
            None => Err(DreaderError::Browser(
                "Failed to launch browser: No such file or directory".into(),
            )),
        }
    }
}
