//! Error types for transfer operations.
//!
//! Errors are categorized to drive the retry loop: anything the remote or the
//! network might fix by itself is retried, while rejected credentials and a
//! missing daemon fail fast.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Daemon error code for an HTTP authorization failure.
pub const AUTH_ERROR_CODE: &str = "24";

/// Categories of transfer errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Control channel unreachable or misbehaving (transient, retryable).
    Network,
    /// The transfer itself failed remotely (transient, retryable).
    Transfer,
    /// The remote rejected our credentials.
    Auth,
    /// The daemon could not be started or reached at all.
    Unavailable,
    /// Unexpected response shape.
    Format,
    /// Local filesystem problem.
    Filesystem,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Transfer)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Daemon connection issue",
            Self::Transfer => "Transfer failed",
            Self::Auth => "Authorization rejected",
            Self::Unavailable => "Download daemon unavailable",
            Self::Format => "Invalid daemon response",
            Self::Filesystem => "Filesystem error",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network | Self::Transfer => "Check your network connection and try again",
            Self::Auth => "Check the API token in your environment variables",
            Self::Unavailable => "Make sure aria2c is installed and the RPC port is free",
            Self::Format => "Check the aria2 version and RPC secret",
            Self::Filesystem => "Check directory permissions and free space",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during transfer operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request to the control channel failed.
    #[error("RPC request failed: {0}")]
    Http(String),

    /// The daemon answered with a JSON-RPC error.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// JSON-RPC error message
        message: String,
    },

    /// The daemon could not be started or never became reachable.
    #[error("download daemon unavailable: {0}")]
    DaemonUnavailable(String),

    /// The transfer stopped in the error state.
    #[error("{message}")]
    TransferFailed {
        /// Daemon error code, if reported
        code: Option<String>,
        /// Daemon error message
        message: String,
    },

    /// The transfer was removed before completing.
    #[error("download was removed")]
    TransferRemoved,

    /// The remote rejected the supplied credentials.
    #[error("authorization failed: {0}")]
    AuthRejected(String),

    /// Invalid response from the daemon.
    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify a transfer that ended in the error state.
    ///
    /// Authorization failures are recognized by message or by the daemon's
    /// dedicated error code.
    pub fn from_transfer(code: Option<String>, message: Option<String>) -> Self {
        let message = message.unwrap_or_else(|| "download failed".to_string());
        let auth = code.as_deref() == Some(AUTH_ERROR_CODE)
            || message.to_lowercase().contains("authorization failed");
        if auth {
            Self::AuthRejected(message)
        } else {
            Self::TransferFailed { code, message }
        }
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Http(_) | Error::Rpc { .. } => ErrorCategory::Network,
            Error::TransferFailed { .. } | Error::TransferRemoved => ErrorCategory::Transfer,
            Error::AuthRejected(_) => ErrorCategory::Auth,
            Error::DaemonUnavailable(_) => ErrorCategory::Unavailable,
            Error::InvalidResponse(_) => ErrorCategory::Format,
            Error::Io { .. } => ErrorCategory::Filesystem,
            Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http(format!("HTTP {code}")),
            other => Self::Http(other.to_string()),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
