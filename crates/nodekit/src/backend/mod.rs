//! Backend abstraction for custom node tooling.
//!
//! The [`Manager`] trait wraps the extension-manager CLI that installs
//! registry nodes and runs per-node setup, while [`Vcs`] wraps the git
//! operations needed for nodes sourced from a repository.
//!
//! # Testing
//!
//! Use [`MockManager`] and [`MockVcs`] to exercise reconciliation logic
//! without spawning anything:
//!
//! ```
//! use declarative::ApplyContext;
//! use nodekit::{InstallOutcome, Manager, MockManager};
//!
//! let manager = MockManager::new();
//! manager.fail_install("broken-node", "No module named 'torch'");
//!
//! let ctx = ApplyContext::detached();
//! assert_eq!(
//!     manager.install("comfyui-kjnodes", "nightly", &ctx).unwrap(),
//!     InstallOutcome::Installed
//! );
//! assert!(manager.install("broken-node", "nightly", &ctx).is_err());
//! ```

pub mod git;
pub mod manager;

use crate::error::{Error, Result};
use crate::types::InstallOutcome;
use declarative::ApplyContext;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Operations offered by the extension manager.
pub trait Manager: Send + Sync {
    /// Install a registry node at the given version.
    fn install(&self, id: &str, version: &str, ctx: &ApplyContext) -> Result<InstallOutcome>;

    /// Uninstall a registry node.
    fn uninstall(&self, id: &str, ctx: &ApplyContext) -> Result<()>;

    /// Refresh the node checked out at `path`.
    fn update(&self, path: &Path, ctx: &ApplyContext) -> Result<()>;

    /// Run the dependency setup for a checked-out node.
    fn post_install(&self, path: &Path, ctx: &ApplyContext) -> Result<()>;
}

/// Version control operations for repository-sourced nodes.
pub trait Vcs: Send + Sync {
    /// Clone `url` into `dest`, optionally checking out `reference`.
    fn clone_repo(
        &self,
        url: &str,
        reference: Option<&str>,
        dest: &Path,
        ctx: &ApplyContext,
    ) -> Result<()>;

    /// Whether `path` is the top level of a working tree.
    fn is_checkout(&self, path: &Path) -> bool;
}

/// A call recorded by the mocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `install <id>@<version>`
    Install(String, String),
    /// `uninstall <id>`
    Uninstall(String),
    /// `update <path>`
    Update(PathBuf),
    /// `post-install <path>`
    PostInstall(PathBuf),
    /// `git clone`
    Clone {
        /// Repository URL
        url: String,
        /// Branch, tag or commit
        reference: Option<String>,
        /// Destination directory
        dest: PathBuf,
    },
}

/// In-memory extension manager for tests.
///
/// Successful installs create the node directory under `root` when one is
/// set, mirroring what the real manager leaves on disk.
#[derive(Debug, Clone, Default)]
pub struct MockManager {
    root: Option<PathBuf>,
    calls: Arc<Mutex<Vec<Call>>>,
    install_failures: Arc<Mutex<HashMap<String, String>>>,
    outcomes: Arc<Mutex<HashMap<String, InstallOutcome>>>,
    failing_setup: Arc<Mutex<HashSet<PathBuf>>>,
    failing_uninstall: Arc<Mutex<HashSet<String>>>,
}

impl MockManager {
    /// Create a mock that touches nothing on disk.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that materializes installed nodes under `root`.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Make installs of `id` fail with `message`.
    pub fn fail_install(&self, id: &str, message: &str) {
        self.install_failures
            .lock()
            .unwrap()
            .insert(id.to_string(), message.to_string());
    }

    /// Report `outcome` for installs of `id` instead of `INSTALLED`.
    pub fn set_outcome(&self, id: &str, outcome: InstallOutcome) {
        self.outcomes.lock().unwrap().insert(id.to_string(), outcome);
    }

    /// Make post-install setup fail for `path`.
    pub fn fail_setup(&self, path: impl Into<PathBuf>) {
        self.failing_setup.lock().unwrap().insert(path.into());
    }

    /// Make uninstalls of `id` fail.
    pub fn fail_uninstall(&self, id: &str) {
        self.failing_uninstall.lock().unwrap().insert(id.to_string());
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Manager for MockManager {
    fn install(&self, id: &str, version: &str, _ctx: &ApplyContext) -> Result<InstallOutcome> {
        self.record(Call::Install(id.to_string(), version.to_string()));

        if let Some(message) = self.install_failures.lock().unwrap().get(id) {
            return Err(Error::Reported {
                message: message.clone(),
            });
        }

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(InstallOutcome::Installed);

        if let Some(root) = &self.root {
            fs::create_dir_all(root.join(id))?;
        }
        Ok(outcome)
    }

    fn uninstall(&self, id: &str, _ctx: &ApplyContext) -> Result<()> {
        self.record(Call::Uninstall(id.to_string()));
        if self.failing_uninstall.lock().unwrap().contains(id) {
            return Err(Error::CommandFailed {
                program: "uninstall".to_string(),
                status: "exit status 1".to_string(),
            });
        }
        Ok(())
    }

    fn update(&self, path: &Path, _ctx: &ApplyContext) -> Result<()> {
        self.record(Call::Update(path.to_path_buf()));
        Ok(())
    }

    fn post_install(&self, path: &Path, _ctx: &ApplyContext) -> Result<()> {
        self.record(Call::PostInstall(path.to_path_buf()));
        if self.failing_setup.lock().unwrap().contains(path) {
            return Err(Error::CommandFailed {
                program: "post-install".to_string(),
                status: "exit status 1".to_string(),
            });
        }
        Ok(())
    }
}

/// In-memory git for tests.
///
/// Successful clones create the destination directory and register it as a
/// checkout.
#[derive(Debug, Clone, Default)]
pub struct MockVcs {
    calls: Arc<Mutex<Vec<Call>>>,
    checkouts: Arc<Mutex<HashSet<PathBuf>>>,
    failing_urls: Arc<Mutex<HashSet<String>>>,
}

impl MockVcs {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make clones of `url` fail after leaving a partial directory behind.
    pub fn fail_clone(&self, url: &str) {
        self.failing_urls.lock().unwrap().insert(url.to_string());
    }

    /// Register an existing directory as a checkout.
    pub fn add_checkout(&self, path: impl Into<PathBuf>) {
        self.checkouts.lock().unwrap().insert(path.into());
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl Vcs for MockVcs {
    fn clone_repo(
        &self,
        url: &str,
        reference: Option<&str>,
        dest: &Path,
        _ctx: &ApplyContext,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Clone {
            url: url.to_string(),
            reference: reference.map(str::to_string),
            dest: dest.to_path_buf(),
        });

        fs::create_dir_all(dest)?;
        if self.failing_urls.lock().unwrap().contains(url) {
            return Err(Error::CommandFailed {
                program: "git clone".to_string(),
                status: "exit status 128".to_string(),
            });
        }

        self.checkouts.lock().unwrap().insert(dest.to_path_buf());
        Ok(())
    }

    fn is_checkout(&self, path: &Path) -> bool {
        self.checkouts.lock().unwrap().contains(path)
    }
}
