//! # dreader
//!
//! Archives chat channel history by driving a logged-in browser session.
//!
//! ## Architecture
//!
//! ```text
//! Browser page → Scroller → Extractor → Store
//!                    ↑                    │
//!                    └── JobController ←──┘
//! ```
//!
//! - [`browser`]: page driver trait, Chrome implementation and locators
//! - [`scraper`]: the scrape engine (scrolling, extraction, job control)
//! - [`store`]: SQLite persistence layer
//!
//! ## Quick Start
//!
//! ```bash
//! # Create the database
//! dreader init-db
//!
//! # Archive a channel (set [scraper] profile_dir to a logged-in profile first)
//! dreader scrape --server-id 1234 --channel-id 5678 --channel-name general
//!
//! # Browse what was archived
//! dreader channels
//! dreader messages --channel 5678 --limit 20
//! dreader jobs
//! ```

/// Application context and error handling.
///
/// [`AppContext`](app::AppContext) wires the store and configuration
/// together; [`DreaderError`](app::DreaderError) classifies failures with
/// an [`ErrorKind`](app::ErrorKind).
pub mod app;

/// Browser capability layer.
///
/// - [`BrowserDriver`](browser::BrowserDriver): what the engine needs from a page
/// - [`ChromeDriver`](browser::ChromeDriver): chromiumoxide implementation
/// - [`Locators`](browser::Locators): configurable element selectors
pub mod browser;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/dreader/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`Server`](domain::Server) and [`Channel`](domain::Channel): scrape targets
/// - [`Message`](domain::Message): archived message keyed by channel and id
/// - [`ScrapeJob`](domain::ScrapeJob) and [`JobStatus`](domain::JobStatus): job state machine
pub mod domain;

pub mod logging;

/// The scrape engine.
///
/// - [`ScrapeOrchestrator`](scraper::ScrapeOrchestrator): runs one job per channel
/// - [`JobController`](scraper::JobController): job lifecycle and retry policy
/// - [`MessageScroller`](scraper::MessageScroller): top-of-history detection
/// - [`MessageExtractor`](scraper::MessageExtractor): snapshot to messages
pub mod scraper;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;
