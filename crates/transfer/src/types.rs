//! Core types for file transfers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Suffix of the control file the daemon keeps beside an unfinished download.
pub const CONTROL_FILE_SUFFIX: &str = ".aria2";

/// A single-URL transfer into `dir/filename`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Source URL, already augmented with any credentials
    pub url: String,
    /// Destination directory
    pub dir: PathBuf,
    /// Destination file name
    pub filename: String,
    /// Optional extra request header, `Name: value`
    pub header: Option<String>,
}

impl DownloadRequest {
    /// Create a request without extra headers.
    pub fn new(url: impl Into<String>, dir: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dir: dir.into(),
            filename: filename.into(),
            header: None,
        }
    }

    /// Attach a request header.
    #[must_use]
    pub fn with_header(mut self, header: Option<String>) -> Self {
        self.header = header;
        self
    }

    /// Final path of the downloaded file.
    pub fn destination(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }

    /// Path of the daemon's control file for this download.
    pub fn control_file(&self) -> PathBuf {
        control_file_for(&self.destination())
    }
}

/// Control file path for a destination file.
pub fn control_file_for(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_os_string();
    name.push(CONTROL_FILE_SUFFIX);
    PathBuf::from(name)
}

/// Daemon-assigned transfer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(pub String);

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state reported by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    /// Downloading
    Active,
    /// Queued
    Waiting,
    /// Paused
    Paused,
    /// Stopped with an error
    Error,
    /// Finished
    Complete,
    /// Removed by someone
    Removed,
}

impl TransferState {
    /// Whether the daemon will make no further progress on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Complete | Self::Removed)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Waiting => "waiting",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Complete => "complete",
            Self::Removed => "removed",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStatus {
    /// Current state
    pub state: TransferState,
    /// Bytes received so far
    pub completed: u64,
    /// Total size, 0 while unknown
    pub total: u64,
    /// Current speed in bytes per second
    pub speed: u64,
    /// Daemon error code, set in the error state
    pub error_code: Option<String>,
    /// Daemon error message, set in the error state
    pub error_message: Option<String>,
}

impl TransferStatus {
    /// A status with no progress in the given state.
    pub fn new(state: TransferState) -> Self {
        Self {
            state,
            completed: 0,
            total: 0,
            speed: 0,
            error_code: None,
            error_message: None,
        }
    }

    /// Completion in percent, `None` while the size is unknown.
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.completed as f64 * 100.0 / self.total as f64)
    }

    /// One-line progress report: `42.0% | 1.2 GiB/2.9 GiB [12.5 MiB/s]`.
    pub fn progress_line(&self) -> String {
        let pct = self
            .percent()
            .map_or_else(|| "?".to_string(), |p| format!("{p:.1}%"));
        format!(
            "{pct} | {}/{} [{}/s]",
            human_bytes(self.completed),
            human_bytes(self.total),
            human_bytes(self.speed)
        )
    }
}

/// Format a byte count with binary units.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier applied per attempt, 1.0 for a fixed interval
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }
}

impl RetryConfig {
    /// Retry up to `max_attempts` times, waiting `interval` between attempts.
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: interval,
            backoff_factor: 1.0,
            max_delay: interval,
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}
