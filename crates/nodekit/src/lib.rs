//! # nodekit
//!
//! Adapters for the external tools that install and maintain custom nodes.
//!
//! This crate provides:
//! - [`exec`]: a process executor that streams every output line into the
//!   log (prefixed with the caller's [`declarative::ApplyContext`]) while
//!   capturing it for later inspection
//! - [`parse`]: pure parsing rules for the extension-manager CLI output, so
//!   result scraping is testable without spawning anything
//! - [`backend`]: the [`Manager`] and [`Vcs`] traits, their CLI
//!   implementations and in-memory mocks
//!
//! ## Example
//!
//! ```no_run
//! use declarative::ApplyContext;
//! use nodekit::{CliManager, InstallOutcome, Manager};
//! use std::path::Path;
//!
//! let manager = CliManager::new("python3", Path::new("/workspace/comfyui/custom_nodes/comfyui-manager"));
//! let outcome = manager
//!     .install("comfyui-kjnodes", "nightly", &ApplyContext::detached())
//!     .expect("install failed");
//! assert_eq!(outcome, InstallOutcome::Installed);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod exec;
pub mod parse;
pub mod types;

pub use backend::git::GitCli;
pub use backend::manager::CliManager;
pub use backend::{Call, Manager, MockManager, MockVcs, Vcs};
pub use error::{Error, Result};
pub use exec::{ExecOptions, run_checked, run_streaming};
pub use parse::parse_install_output;
pub use types::{CommandOutput, InstallOutcome};
