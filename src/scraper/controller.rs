use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::app::{DreaderError, ErrorKind, Result};
use crate::domain::{Cursor, JobFailure, JobStatus, ScrapeJob, StopMode};
use crate::scraper::ScrapeConfig;
use crate::store::Store;

/// How transient failures are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated, counting the first one
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ScrapeConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// Delay before the retry that follows failure number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }

    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        kind.is_retryable() && attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ScrapeConfig::default())
    }
}

/// What to do after a failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Retry { attempt: u32, delay: Duration },
    GiveUp,
}

/// Owns one running scrape job and every write to it.
///
/// Status changes go through the store's compare-and-set transitions, so a
/// job that some other writer already finished can never be revived here.
/// Terminal operations consume the controller.
pub struct JobController<S: Store> {
    store: Arc<S>,
    policy: RetryPolicy,
    job: ScrapeJob,
    consecutive_failures: u32,
}

impl<S: Store> JobController<S> {
    /// Resume the channel's paused job, or create a new one that inherits
    /// the depth of an interrupted predecessor, and move it to running.
    pub fn start(store: Arc<S>, channel_id: &str, policy: RetryPolicy) -> Result<Self> {
        let id = match store.find_paused_job(channel_id)? {
            Some(paused) => {
                store.transition_job(paused.id, JobStatus::Paused, JobStatus::Running)?;
                info!(job_id = paused.id, channel_id, "Resuming paused scrape job");
                paused.id
            }
            None => {
                let resume_from = store.resume_cursor(channel_id)?;
                let job = store.create_job(channel_id, resume_from.as_ref())?;
                store.transition_job(job.id, JobStatus::Pending, JobStatus::Running)?;
                info!(
                    job_id = job.id,
                    channel_id,
                    resume_from = ?resume_from.as_ref().map(|c| c.timestamp),
                    "Started scrape job"
                );
                job.id
            }
        };

        let job = store.get_job(id)?.ok_or(DreaderError::JobNotFound(id))?;

        Ok(Self {
            store,
            policy,
            job,
            consecutive_failures: 0,
        })
    }

    /// Cancel a job outside of any run, such as one a killed process left
    /// running or a paused job that should not be resumed. The cursor stays
    /// and the channel's next job inherits it.
    pub fn cancel(store: &S, job_id: i64) -> Result<ScrapeJob> {
        let current = store
            .get_job(job_id)?
            .ok_or(DreaderError::JobNotFound(job_id))?;
        let job = store.finalize_job(job_id, JobStatus::Cancelled, None)?;
        info!(
            job_id,
            channel_id = %job.channel_id,
            from = %current.status,
            cursor = ?job.cursor_timestamp,
            "Scrape job cancelled"
        );
        Ok(job)
    }

    pub fn job(&self) -> &ScrapeJob {
        &self.job
    }

    pub fn id(&self) -> i64 {
        self.job.id
    }

    pub fn cycles(&self) -> u32 {
        self.job.cycles
    }

    /// Count the start of a scroll cycle.
    pub fn begin_cycle(&mut self) -> u32 {
        self.job.cycles += 1;
        self.job.cycles
    }

    /// Record a persisted batch: `inserted` messages new to the archive, and
    /// the batch's oldest message. The cursor only moves back in time.
    /// Returns whether it moved.
    pub fn advance(&mut self, oldest: Option<&Cursor>, inserted: usize) -> Result<bool> {
        self.job.messages_seen += inserted as u64;

        let moved = match oldest {
            Some(cursor) if self.is_deeper(cursor) => {
                let moved = self.store.update_job_cursor(self.job.id, cursor)?;
                if moved {
                    self.job.cursor_message_id = Some(cursor.message_id.clone());
                    self.job.cursor_timestamp = Some(cursor.timestamp);
                }
                moved
            }
            _ => false,
        };

        self.persist_progress()?;
        Ok(moved)
    }

    fn is_deeper(&self, cursor: &Cursor) -> bool {
        self.job
            .cursor()
            .map_or(true, |current| cursor.is_older_than(&current))
    }

    /// A step succeeded; the failure streak starts over.
    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count a failure and decide whether to retry it.
    pub fn on_failure(&mut self, err: &DreaderError) -> Result<FailureAction> {
        self.consecutive_failures += 1;
        self.job.attempts += 1;
        self.persist_progress()?;

        let attempt = self.consecutive_failures;
        let kind = err.kind();

        if self.policy.should_retry(kind, attempt) {
            Ok(FailureAction::Retry {
                attempt,
                delay: self.policy.backoff(attempt),
            })
        } else {
            debug!(job_id = self.job.id, %kind, attempt, "Failure not retried");
            Ok(FailureAction::GiveUp)
        }
    }

    fn persist_progress(&self) -> Result<()> {
        self.store.record_job_progress(
            self.job.id,
            self.job.attempts,
            self.job.cycles,
            self.job.messages_seen,
        )
    }

    pub fn complete(self) -> Result<ScrapeJob> {
        let job = self
            .store
            .finalize_job(self.job.id, JobStatus::Completed, None)?;
        info!(
            job_id = job.id,
            channel_id = %job.channel_id,
            cycles = job.cycles,
            messages_seen = job.messages_seen,
            "Scrape job completed"
        );
        Ok(job)
    }

    /// Mark the job failed with the error's own description.
    pub fn fail(self, err: &DreaderError, screenshot_path: Option<String>) -> Result<ScrapeJob> {
        let failure = JobFailure {
            kind: err.kind(),
            message: err.to_string(),
            screenshot_path,
        };
        let job = self
            .store
            .finalize_job(self.job.id, JobStatus::Failed, Some(&failure))?;
        warn!(
            job_id = job.id,
            channel_id = %job.channel_id,
            kind = %failure.kind,
            attempts = job.attempts,
            error = %failure.message,
            "Scrape job failed"
        );
        Ok(job)
    }

    /// Pause or cancel on request; the cursor stays for the next run.
    pub fn stop(self, mode: StopMode) -> Result<ScrapeJob> {
        let job = self
            .store
            .finalize_job(self.job.id, mode.target_status(), None)?;
        info!(
            job_id = job.id,
            channel_id = %job.channel_id,
            status = %job.status,
            cursor = ?job.cursor_timestamp,
            "Scrape job stopped"
        );
        Ok(job)
    }
}
