use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DreaderError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Timed out after {timeout_ms}ms waiting for selector {selector}")]
    SelectorTimeout { selector: String, timeout_ms: u64 },

    #[error("Expected {role} element ({selector}) is not present on the page")]
    SelectorMissing { role: String, selector: String },

    #[error("Unexpected view: expected {expected}, got {url} ({title})")]
    WrongView {
        expected: String,
        url: String,
        title: String,
    },

    #[error("Browser session is no longer authenticated (redirected to {url})")]
    SessionInvalidated { url: String },

    #[error("Malformed page snapshot: {0}")]
    Snapshot(String),

    #[error("Channel {channel_id} already has an active scrape job ({job_id})")]
    JobConflict { channel_id: String, job_id: i64 },

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: i64,
        from: String,
        to: String,
    },

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Failure category used by the retry policy and recorded on failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Timing hiccups; worth retrying with backoff.
    Transient,
    /// The page no longer matches the configured locators or view.
    Structural,
    /// The store rejected or could not take the write.
    Persistence,
    /// The browser session is gone or needs re-authentication.
    Unrecoverable,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Structural => "structural",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Unrecoverable => "unrecoverable",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transient" => Some(ErrorKind::Transient),
            "structural" => Some(ErrorKind::Structural),
            "persistence" => Some(ErrorKind::Persistence),
            "unrecoverable" => Some(ErrorKind::Unrecoverable),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DreaderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DreaderError::Navigation(_) | DreaderError::SelectorTimeout { .. } => {
                ErrorKind::Transient
            }
            DreaderError::SelectorMissing { .. }
            | DreaderError::WrongView { .. }
            | DreaderError::Snapshot(_)
            | DreaderError::Json(_) => ErrorKind::Structural,
            DreaderError::Database(_)
            | DreaderError::Migration(_)
            | DreaderError::JobConflict { .. }
            | DreaderError::InvalidTransition { .. }
            | DreaderError::JobNotFound(_)
            | DreaderError::ChannelNotFound(_) => ErrorKind::Persistence,
            DreaderError::Browser(_)
            | DreaderError::SessionInvalidated { .. }
            | DreaderError::Io(_)
            | DreaderError::InvalidUrl(_)
            | DreaderError::Config(_)
            | DreaderError::Other(_) => ErrorKind::Unrecoverable,
        }
    }
}

pub type Result<T> = std::result::Result<T, DreaderError>;
