use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ACTIVE: [JobStatus; 2] = [JobStatus::Pending, JobStatus::Running];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Pending and running jobs hold the channel; at most one may exist.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "paused" => Ok(JobStatus::Paused),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("Unknown job status: {}", other)),
        }
    }
}

/// Oldest message a job has durably recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Cursor {
    pub fn new(message_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            message_id: message_id.into(),
            timestamp,
        }
    }

    pub fn is_older_than(&self, other: &Cursor) -> bool {
        self.timestamp < other.timestamp
    }
}

/// Why a job ended in `failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub screenshot_path: Option<String>,
}

/// How an externally stopped job should be left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Keep the job resumable.
    Pause,
    /// End the job; a later job inherits its cursor.
    Cancel,
}

impl StopMode {
    pub fn target_status(&self) -> JobStatus {
        match self {
            StopMode::Pause => JobStatus::Paused,
            StopMode::Cancel => JobStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub id: i64,
    pub channel_id: String,
    pub status: JobStatus,
    pub cursor_message_id: Option<String>,
    pub cursor_timestamp: Option<DateTime<Utc>>,
    pub attempts: u32,
    pub cycles: u32,
    /// Messages this job added to the archive, across all of its runs
    pub messages_seen: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub screenshot_path: Option<String>,
}

impl ScrapeJob {
    pub fn cursor(&self) -> Option<Cursor> {
        match (&self.cursor_message_id, self.cursor_timestamp) {
            (Some(id), Some(ts)) => Some(Cursor::new(id.clone(), ts)),
            _ => None,
        }
    }
}
