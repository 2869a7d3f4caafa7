//! Core types for node tooling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result reported by the extension manager for a single install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstallOutcome {
    /// The node was freshly installed
    Installed,
    /// The node was already present
    Skip,
    /// The node was present but disabled, and has been re-enabled
    Enabled,
}

impl InstallOutcome {
    /// Parse the marker word printed between brackets.
    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "INSTALLED" => Some(Self::Installed),
            "SKIP" => Some(Self::Skip),
            "ENABLED" => Some(Self::Enabled),
            _ => None,
        }
    }

    /// Whether the manager actually changed anything.
    pub fn is_fresh_install(&self) -> bool {
        matches!(self, Self::Installed)
    }
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self {
            Self::Installed => "INSTALLED",
            Self::Skip => "SKIP",
            Self::Enabled => "ENABLED",
        };
        write!(f, "{marker}")
    }
}

/// Output captured from a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    /// Everything the process wrote to stdout
    pub stdout: String,
    /// Everything the process wrote to stderr
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Human-readable exit status.
    pub fn status_string(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_outcome_markers() {
        assert_eq!(
            InstallOutcome::from_marker("INSTALLED"),
            Some(InstallOutcome::Installed)
        );
        assert_eq!(InstallOutcome::from_marker("SKIP"), Some(InstallOutcome::Skip));
        assert_eq!(
            InstallOutcome::from_marker("ENABLED"),
            Some(InstallOutcome::Enabled)
        );
        assert_eq!(InstallOutcome::from_marker("FAILED"), None);
        assert!(InstallOutcome::Installed.is_fresh_install());
        assert!(!InstallOutcome::Skip.is_fresh_install());
    }

    #[test]
    fn test_command_output_status() {
        let ok = CommandOutput {
            code: Some(0),
            ..Default::default()
        };
        assert!(ok.success());

        let killed = CommandOutput::default();
        assert!(!killed.success());
        assert_eq!(killed.status_string(), "terminated by signal");
    }
}
