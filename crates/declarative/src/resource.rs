//! Resource trait for reconciled artifacts
//!
//! A Resource is one managed artifact on disk. Its lifecycle operations
//! (install, remove, move) are specific to each kind and live on the concrete
//! types; this trait only carries what the engine needs generically.

use crate::context::ApplyContext;
use crate::types::ResourceState;
use anyhow::Result;
use std::fmt;

/// Core trait for reconciled resources
pub trait Resource: fmt::Debug {
    /// Collaborators needed to inspect the resource, `()` when none are
    type Env: ?Sized;

    /// Identifier shown to operators (summary lists, failure reports)
    fn id(&self) -> String;

    /// Resource type category, e.g. "node" or "model"
    fn resource_type(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> String {
        format!("{} {}", self.resource_type(), self.id())
    }

    /// Detect the current state on disk
    ///
    /// Inspecting may repair: an invalid or half-written artifact is purged and
    /// reported as [`ResourceState::Absent`].
    fn inspect(&self, env: &Self::Env, ctx: &ApplyContext) -> Result<ResourceState>;
}
