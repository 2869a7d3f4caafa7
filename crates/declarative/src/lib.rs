//! # Declarative
//!
//! Primitives for reconciling a desired snapshot of resources against the
//! snapshot achieved by a previous run.
//!
//! This crate knows nothing about what a resource *is*. It provides:
//!
//! - **Identity by key**: [`dedup_by_key`] and [`difference_by`] take an
//!   explicit key-extraction function instead of relying on `Eq`
//!   implementations, so one routine serves every resource kind.
//! - **Tri-state results**: [`ApplyResult`] is `Success`, `NoOp` or
//!   `Failed { reason }`.
//! - **Actions**: [`Action`] tags what the engine intends to do with a resource.
//! - **Phases**: [`run_phase`] executes a batch sequentially, handing each
//!   action an [`ApplyContext`] that renders as `"[k/total] "` for log lines.
//!
//! ## Example
//!
//! ```
//! use declarative::{difference_by, run_phase, ApplyResult};
//!
//! let desired = vec!["a", "b", "c"];
//! let achieved = vec!["b", "c", "d"];
//!
//! let install = difference_by(&desired, &achieved, |s| s.to_string());
//! assert_eq!(install, vec![&"a"]);
//!
//! let applied = run_phase(&install, |item, ctx| {
//!     log::info!("{ctx}installing {item}");
//!     Ok(ApplyResult::Success)
//! });
//! assert_eq!(applied.len(), 1);
//! ```

pub mod context;
pub mod diff;
pub mod executor;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use context::{ApplyContext, PhaseProgress};
pub use diff::{Dedup, dedup_by_key, difference_by};
pub use executor::{Applied, run_phase, summarize};
pub use resource::Resource;
pub use types::{Action, ActionKind, ApplyResult, ExecuteSummary, ResourceState};
