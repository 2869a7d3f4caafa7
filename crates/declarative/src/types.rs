//! Core types for declarative reconciliation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed state of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Resource exists and is usable
    Present,
    /// Resource does not exist (or was purged because it was invalid)
    Absent,
}

impl ResourceState {
    /// Check if state represents presence
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present)
    }

    /// Check if state represents absence
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Result of applying one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// The action changed something
    Success,
    /// Nothing needed to be done
    NoOp,
    /// The action failed; the resource will be retried next run
    Failed { reason: String },
}

impl ApplyResult {
    /// Build a failure from anything displayable
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self::Failed {
            reason: reason.to_string(),
        }
    }

    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Check if the result is a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NoOp => write!(f, "no-op"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Kind of an [`Action`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Install,
    Remove,
    Move,
    Update,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Move => "move",
            Self::Update => "update",
        };
        write!(f, "{verb}")
    }
}

/// An action the engine intends to run against a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action<R> {
    /// Bring an absent resource into existence
    Install { resource: R },
    /// Delete a resource that is no longer desired
    Remove { resource: R },
    /// Relocate an existing resource instead of fetching it again
    Move { from: R, to: R },
    /// Refresh a resource that is already installed
    Update { resource: R },
}

impl<R> Action<R> {
    /// The kind of this action
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Install { .. } => ActionKind::Install,
            Self::Remove { .. } => ActionKind::Remove,
            Self::Move { .. } => ActionKind::Move,
            Self::Update { .. } => ActionKind::Update,
        }
    }

    /// The resource this action leaves behind (the destination for a move)
    pub fn target(&self) -> &R {
        match self {
            Self::Install { resource } | Self::Remove { resource } | Self::Update { resource } => {
                resource
            }
            Self::Move { to, .. } => to,
        }
    }
}

/// Tally of results for one phase or one whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub succeeded: usize,
    pub no_op: usize,
    pub failed: usize,
}

impl ExecuteSummary {
    /// Count one result
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::Success => self.succeeded += 1,
            ApplyResult::NoOp => self.no_op += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
        }
    }

    /// Total number of actions processed
    pub fn total(&self) -> usize {
        self.succeeded + self.no_op + self.failed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.succeeded += other.succeeded;
        self.no_op += other.no_op;
        self.failed += other.failed;
    }
}
