//! Tracing setup: compact stderr output plus daily-rotated JSON lines.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::{DreaderError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when neither `DREADER_LOG` nor `RUST_LOG` is set
    pub level: String,
    /// Write JSON lines to `<dir>/dreader.<date>.jsonl`
    pub file: bool,
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: true,
            dir: None,
        }
    }
}

impl LoggingConfig {
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join("dreader").join("logs")))
    }
}

/// Pick the filter directive: `DREADER_LOG`, then `RUST_LOG`, then config.
fn resolve_directive(
    dreader_log: Option<String>,
    rust_log: Option<String>,
    configured: &str,
) -> String {
    let set = |value: Option<String>| value.filter(|d| !d.trim().is_empty());
    set(dreader_log)
        .or_else(|| set(rust_log))
        .unwrap_or_else(|| configured.to_string())
}

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    let directive = resolve_directive(
        std::env::var("DREADER_LOG").ok(),
        std::env::var("RUST_LOG").ok(),
        &config.level,
    );
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match config.file.then(|| config.log_dir()).flatten() {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let appender = Builder::new()
                .rotation(Rotation::DAILY)
                .filename_prefix("dreader")
                .filename_suffix("jsonl")
                .build(&dir)
                .map_err(|e| {
                    DreaderError::Config(format!(
                        "Failed to open log directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_current_span(false)
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| DreaderError::Other(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}
