//! Phase-scoped progress context
//!
//! A phase hands every action an [`ApplyContext`] describing where it sits in
//! the batch. Anything that logs on behalf of the action interpolates the
//! context as a prefix, so the `[k/total]` annotation lives exactly as long as
//! the phase and never touches the global logger.

use std::fmt;

/// Position of the current action inside a phase
///
/// Renders as `"[k/total] "`. A detached context (outside any phase) renders
/// as an empty string, so `log::info!("{ctx}...")` works in both cases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyContext {
    step: usize,
    total: usize,
}

impl ApplyContext {
    /// Context for work that runs outside any phase
    pub const fn detached() -> Self {
        Self { step: 0, total: 0 }
    }

    /// 1-based index of the current action
    pub fn step(&self) -> usize {
        self.step
    }

    /// Number of actions in the phase
    pub fn total(&self) -> usize {
        self.total
    }

    /// Whether this context belongs to no phase
    pub fn is_detached(&self) -> bool {
        self.total == 0
    }
}

impl fmt::Display for ApplyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_detached() {
            return Ok(());
        }
        write!(f, "[{}/{}] ", self.step, self.total)
    }
}

/// Scoped step counter for one phase
#[derive(Debug)]
pub struct PhaseProgress {
    current: usize,
    total: usize,
}

impl PhaseProgress {
    /// Start a phase of `total` actions
    pub fn new(total: usize) -> Self {
        Self { current: 0, total }
    }

    /// Move to the next action and return its context
    ///
    /// Never advances past `total`.
    pub fn advance(&mut self) -> ApplyContext {
        if self.current < self.total {
            self.current += 1;
        }
        self.context()
    }

    /// Context for the current step
    pub fn context(&self) -> ApplyContext {
        ApplyContext {
            step: self.current,
            total: self.total,
        }
    }
}
