//! Custom node resource

use super::EntryError;
use crate::config::repo_name_from_url;
use crate::runner::ScriptRunner;
use crate::settings::{Network, Settings};
use crate::state::NodeRecord;
use anyhow::{Context, Result};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState};
use nodekit::{InstallOutcome, Manager, Vcs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_REGISTRY_VERSION: &str = "nightly";

/// Where a node comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeSource {
    /// The extension manager's registry
    Registry,
    /// A git repository
    Git,
}

impl fmt::Display for NodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry => write!(f, "registry"),
            Self::Git => write!(f, "git"),
        }
    }
}

/// Raw `[[custom_nodes]]` entry
#[derive(Debug, Deserialize)]
struct NodeEntry {
    node_id: Option<String>,
    url: Option<String>,
    version: Option<String>,
    branch: Option<String>,
    script: Option<PathBuf>,
}

/// Collaborators for node lifecycle operations
#[derive(Clone, Copy)]
pub struct NodeTools<'a> {
    pub manager: &'a dyn Manager,
    pub vcs: &'a (dyn Vcs + 'static),
    pub scripts: &'a ScriptRunner,
    pub network: &'a Network,
}

/// A custom node, identified by its lowercase name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub name: String,
    pub source: NodeSource,
    pub version: Option<String>,
    pub url: Option<String>,
    pub script: Option<PathBuf>,
    pub path: PathBuf,
}

impl Node {
    fn new(
        name: &str,
        source: NodeSource,
        version: Option<String>,
        url: Option<String>,
        script: Option<PathBuf>,
        settings: &Settings,
    ) -> Self {
        let name = name.trim().to_lowercase();
        let version = match source {
            NodeSource::Registry => {
                Some(version.unwrap_or_else(|| DEFAULT_REGISTRY_VERSION.to_string()))
            }
            NodeSource::Git => version,
        };
        Self {
            path: settings.custom_nodes_dir().join(&name),
            script: script.map(|s| settings.node_scripts_dir().join(s)),
            name,
            source,
            version,
            url,
        }
    }

    /// Build a desired node from a `[[custom_nodes]]` entry.
    ///
    /// `node_id` selects the registry and wins over `url`; otherwise `url`
    /// selects git and the repository name becomes the node name.
    pub fn from_entry(value: &toml::Value, settings: &Settings) -> Result<Self, EntryError> {
        let entry: NodeEntry = value.clone().try_into()?;

        if let Some(id) = entry.node_id.as_deref().filter(|s| !s.trim().is_empty()) {
            if entry.url.is_some() {
                log::warn!("Node '{id}' has both 'node_id' and 'url', using the registry");
            }
            return Ok(Self::new(
                id,
                NodeSource::Registry,
                entry.version,
                None,
                entry.script,
                settings,
            ));
        }

        let url = entry
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or(EntryError::MissingIdentity)?;
        let name = repo_name_from_url(&url)
            .filter(|n| !n.contains(':'))
            .ok_or_else(|| EntryError::InvalidGitUrl(url.clone()))?;
        Ok(Self::new(
            &name,
            NodeSource::Git,
            entry.branch.or(entry.version),
            Some(url),
            entry.script,
            settings,
        ))
    }

    /// Rebuild an achieved node from the previous boot's record
    pub fn from_record(record: &NodeRecord, settings: &Settings) -> Self {
        Self::new(
            &record.name,
            record.source,
            record.version.clone(),
            record.url.clone(),
            record.script.clone(),
            settings,
        )
    }

    pub fn to_record(&self) -> NodeRecord {
        NodeRecord {
            name: self.name.clone(),
            source: self.source,
            version: self.version.clone(),
            url: self.url.clone(),
            script: self.script.clone(),
            path: self.path.clone(),
        }
    }

    pub fn is_excluded(&self) -> bool {
        Settings::is_excluded(&self.name)
    }

    /// Install the node if absent.
    ///
    /// With `repair_existing`, a node already on disk has its setup re-run
    /// instead of being skipped.
    pub fn install(
        &self,
        repair_existing: bool,
        tools: NodeTools<'_>,
        ctx: &ApplyContext,
    ) -> Result<ApplyResult> {
        if self.is_excluded() {
            log::warn!("{ctx}{} is excluded from installation. Skipped.", self.name);
            return Ok(ApplyResult::NoOp);
        }
        if self.inspect(tools.vcs, ctx)?.is_present() {
            if !repair_existing {
                log::info!("{ctx}{} already exists. Skipped.", self.name);
                return Ok(ApplyResult::NoOp);
            }
            log::warn!("{ctx}{} already exists, trying to setup...", self.name);
            return Ok(match self.setup(tools.manager, ctx) {
                Ok(()) => ApplyResult::Success,
                Err(e) => ApplyResult::failed(format!("{e:#}")),
            });
        }

        log::info!("{ctx}Installing node: {self}");
        let installed = match self.source {
            NodeSource::Registry => self.install_registry(tools.manager, ctx),
            NodeSource::Git => self.install_git(tools, ctx),
        };
        match installed {
            Ok(ApplyResult::Success) => {
                log::info!("{ctx}Successfully installed node: {}", self.name);
                self.run_script(tools.scripts, ctx);
                Ok(ApplyResult::Success)
            }
            Ok(other) => Ok(other),
            Err(e) => {
                log::error!("{ctx}Failed to install node {}: {e:#}", self.name);
                Ok(ApplyResult::failed(format!("{e:#}")))
            }
        }
    }

    fn install_registry(&self, manager: &dyn Manager, ctx: &ApplyContext) -> Result<ApplyResult> {
        let version = self.version.as_deref().unwrap_or(DEFAULT_REGISTRY_VERSION);
        let outcome = manager.install(&self.name, version, ctx)?;
        Ok(match outcome {
            InstallOutcome::Installed => ApplyResult::Success,
            InstallOutcome::Skip => {
                log::info!("{ctx}{} already exists. Skipped.", self.name);
                ApplyResult::NoOp
            }
            InstallOutcome::Enabled => {
                log::warn!("{ctx}{} already exists, but just enabled.", self.name);
                ApplyResult::NoOp
            }
        })
    }

    fn install_git(&self, tools: NodeTools<'_>, ctx: &ApplyContext) -> Result<ApplyResult> {
        let url = self
            .url
            .as_deref()
            .with_context(|| format!("git node {} has no URL", self.name))?;
        let url = tools.network.rewrite(url);

        if let Err(e) = tools
            .vcs
            .clone_repo(&url, self.version.as_deref(), &self.path, ctx)
        {
            purge_dir(&self.path);
            return Err(e.into());
        }
        if let Err(e) = self.setup(tools.manager, ctx) {
            // Leave nothing behind so the next boot retries from scratch
            purge_dir(&self.path);
            return Err(e.context("failed to setup"));
        }
        Ok(ApplyResult::Success)
    }

    fn setup(&self, manager: &dyn Manager, ctx: &ApplyContext) -> Result<()> {
        manager
            .post_install(&self.path, ctx)
            .with_context(|| format!("Failed to initialize node {}", self.name))?;
        log::info!("{ctx}Successfully initialized node: {}", self.name);
        Ok(())
    }

    fn run_script(&self, scripts: &ScriptRunner, ctx: &ApplyContext) {
        let Some(script) = &self.script else {
            return;
        };
        log::info!("{ctx}Executing post-install-node script: {}", script.display());
        if let Err(e) = scripts.run(script, ctx) {
            log::warn!("{ctx}{e:#}");
        }
    }

    /// Uninstall the node and delete its directory
    pub fn remove(&self, tools: NodeTools<'_>, ctx: &ApplyContext) -> Result<ApplyResult> {
        if self.is_excluded() {
            log::warn!("{ctx}{} is excluded from removal. Skipped.", self.name);
            return Ok(ApplyResult::NoOp);
        }
        if self.inspect(tools.vcs, ctx)?.is_absent() {
            log::info!("{ctx}{} not found. Skipped.", self.name);
            return Ok(ApplyResult::NoOp);
        }

        log::info!("{ctx}Removing node: {}", self.name);
        if self.source == NodeSource::Registry
            && let Err(e) = tools.manager.uninstall(&self.name, ctx)
        {
            log::warn!("{ctx}Manager could not uninstall {}: {e}", self.name);
        }
        if self.path.exists() {
            fs::remove_dir_all(&self.path).with_context(|| {
                format!("Failed to uninstall node {}: {}", self.name, self.path.display())
            })?;
        }
        log::info!("{ctx}Uninstalled node: {}", self.name);
        Ok(ApplyResult::Success)
    }

    /// Ask the manager to update this node in place
    pub fn update(&self, tools: NodeTools<'_>, ctx: &ApplyContext) -> Result<ApplyResult> {
        if self.is_excluded() || self.inspect(tools.vcs, ctx)?.is_absent() {
            return Ok(ApplyResult::NoOp);
        }
        tools
            .manager
            .update(&self.path, ctx)
            .with_context(|| format!("Failed to update node {}", self.name))?;
        log::info!("{ctx}Successfully updated node: {}", self.name);
        Ok(ApplyResult::Success)
    }
}

impl Resource for Node {
    type Env = dyn Vcs;

    fn id(&self) -> String {
        self.name.clone()
    }

    fn resource_type(&self) -> &'static str {
        "node"
    }

    fn inspect(&self, vcs: &dyn Vcs, ctx: &ApplyContext) -> Result<ResourceState> {
        let path = &self.path;
        if !path.exists() {
            return Ok(ResourceState::Absent);
        }
        if !path.is_dir() {
            log::warn!("{ctx}{} path invalid, removing: {}", self.name, path.display());
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            return Ok(ResourceState::Absent);
        }
        if self.source == NodeSource::Git && !vcs.is_checkout(path) {
            log::warn!(
                "{ctx}{} not a valid git repo, removing: {}",
                self.name,
                path.display()
            );
            fs::remove_dir_all(path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            return Ok(ResourceState::Absent);
        }
        Ok(ResourceState::Present)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.source)?;
        if let Some(version) = &self.version
            && version != DEFAULT_REGISTRY_VERSION
        {
            write!(f, " @ {version}")?;
        }
        Ok(())
    }
}

fn purge_dir(path: &Path) {
    if path.exists()
        && let Err(e) = fs::remove_dir_all(path)
    {
        log::error!("Failed to remove {}: {e}", path.display());
    }
}
