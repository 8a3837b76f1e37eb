//! Scrape engine for archiving channel history.
//!
//! Drives a browser page through a scroll, extract and persist loop, one job
//! per channel run. Progress is stored on the job so an interrupted run can
//! be picked up later.
//!
//! # Architecture
//!
//! ```text
//! ScrapeOrchestrator
//!   ├─ JobController     job state, cursor, retry policy
//!   ├─ MessageScroller   scroll offsets and top-of-history detection
//!   ├─ MessageExtractor  snapshot → messages (pure)
//!   └─ Store             idempotent upserts
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use dreader::scraper::{ScrapeConfig, ScrapeOrchestrator, ScrapeTarget, StopSignal};
//!
//! let orchestrator = ScrapeOrchestrator::new(store, launcher, ScrapeConfig::default(), locators);
//! let stop = StopSignal::new();
//! let job = orchestrator.run(&ScrapeTarget::new(server, channel), &stop).await?;
//! println!("{} finished as {}", job.id, job.status);
//! ```
//!
//! Resuming a paused or interrupted job re-navigates to the channel and
//! scrolls down through already archived messages to reach the stored depth:
//! the web client offers no way to seek. Those re-seen messages are cheap
//! no-op upserts.

mod config;
pub mod controller;
pub mod extractor;
pub mod orchestrator;
pub mod scroller;

pub use config::ScrapeConfig;
pub use controller::{FailureAction, JobController, RetryPolicy};
pub use extractor::{ExtractedBatch, MessageExtractor, RawMessage, Snapshot};
pub use orchestrator::{ScrapeOrchestrator, ScrapeTarget, StopSignal};
pub use scroller::MessageScroller;
