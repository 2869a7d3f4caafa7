//! Error types for node tooling.
//!
//! A missing tool, a tool that exited unsuccessfully and a tool that printed
//! its own error are distinct variants so the message shown names the cause.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while driving node tooling.
#[derive(Debug, Error)]
pub enum Error {
    /// The program could not be spawned
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The program exited with a non-zero status
    #[error("{program} failed with {status}")]
    CommandFailed {
        /// Program (and subcommand) that failed
        program: String,
        /// Human-readable exit status
        status: String,
    },

    /// The extension manager printed an `ERROR:` line
    #[error("{message}")]
    Reported {
        /// The most specific message found in the output
        message: String,
    },

    /// The extension manager output had no result marker
    #[error("failed to parse installation result")]
    UnparseableResult,

    /// A path expected to be a checkout is not one
    #[error("not a git checkout: {0}")]
    NotACheckout(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Result type for node tooling operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_error_displays_message_only() {
        let err = Error::Reported {
            message: "No module named 'torch'".to_string(),
        };
        assert_eq!(err.to_string(), "No module named 'torch'");
    }

    #[test]
    fn test_spawn_error_names_program() {
        let err = Error::Spawn {
            program: "git".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(err.to_string(), "failed to execute git: missing");
    }
}
