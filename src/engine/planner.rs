//! Action planning
//!
//! Turns a desired and an achieved snapshot into ordered action queues.
//! Identity is decided by explicit key functions: nodes match by name,
//! models deduplicate by destination path but match across snapshots by URL.

use crate::resource::{EntryError, Model, Node};
use crate::settings::Settings;
use crate::state::{ModelRecord, NodeRecord};
use declarative::{Action, Dedup, dedup_by_key, difference_by};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub fn node_key(node: &Node) -> String {
    node.name.clone()
}

pub fn model_path_key(model: &Model) -> PathBuf {
    model.path.clone()
}

// ============================================================================
// Snapshots
// ============================================================================

/// Parse config entries, skipping (and reporting) the ones that are invalid
fn from_entries<T>(
    kind: &str,
    entries: &[toml::Value],
    settings: &Settings,
    build: fn(&toml::Value, &Settings) -> Result<T, EntryError>,
) -> Vec<T> {
    entries
        .iter()
        .filter_map(|entry| match build(entry, settings) {
            Ok(item) => Some(item),
            Err(e) => {
                log::warn!("Skip invalid {kind} config: {e}\n{entry}");
                None
            }
        })
        .collect()
}

/// Keep the first occurrence of each key, reporting every dropped duplicate
fn dedup<T, K, F>(kind: &str, items: Vec<T>, key: F) -> Dedup<T>
where
    T: std::fmt::Display,
    K: Eq + std::hash::Hash,
    F: Fn(&T) -> K,
{
    let result = dedup_by_key(items, key);
    for dropped in &result.dropped {
        log::warn!("Skip duplicate {kind}: {dropped}");
    }
    result
}

pub fn desired_nodes(entries: &[toml::Value], settings: &Settings) -> Vec<Node> {
    let nodes = from_entries("node", entries, settings, Node::from_entry);
    dedup("node", nodes, node_key).kept
}

pub fn achieved_nodes(records: &[NodeRecord], settings: &Settings) -> Vec<Node> {
    let nodes = records
        .iter()
        .map(|r| Node::from_record(r, settings))
        .collect();
    dedup("node", nodes, node_key).kept
}

pub fn desired_models(entries: &[toml::Value], settings: &Settings) -> Vec<Model> {
    let models = from_entries("model", entries, settings, Model::from_entry);
    dedup("model", models, model_path_key).kept
}

pub fn achieved_models(records: &[ModelRecord], settings: &Settings) -> Vec<Model> {
    let models = records
        .iter()
        .map(|r| Model::from_record(r, settings))
        .collect();
    dedup("model", models, model_path_key).kept
}

// ============================================================================
// Node plan
// ============================================================================

/// Queued node actions, in execution order: update, install, remove
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodePlan<'a> {
    pub update: Vec<&'a Node>,
    pub install: Vec<&'a Node>,
    pub remove: Vec<&'a Node>,
    /// Re-run setup for nodes found on disk during install
    pub repair_existing: bool,
}

impl<'a> NodePlan<'a> {
    pub fn is_empty(&self) -> bool {
        self.update.is_empty() && self.install.is_empty() && self.remove.is_empty()
    }

    pub fn actions(&self) -> Vec<Action<&'a Node>> {
        let update = self.update.iter().map(|&n| Action::Update { resource: n });
        let install = self.install.iter().map(|&n| Action::Install { resource: n });
        let remove = self.remove.iter().map(|&n| Action::Remove { resource: n });
        update.chain(install).chain(remove).collect()
    }
}

/// Plan node actions.
///
/// Without an achieved snapshot every desired node is queued for install
/// with `repair_existing`, so nodes that predate state tracking are set up
/// again instead of silently skipped.
pub fn plan_nodes<'a>(desired: &'a [Node], achieved: &'a [Node], update: bool) -> NodePlan<'a> {
    if achieved.is_empty() {
        return NodePlan {
            update: Vec::new(),
            install: desired.iter().collect(),
            remove: Vec::new(),
            repair_existing: true,
        };
    }

    let update = if update {
        let achieved_names: HashSet<String> = achieved.iter().map(node_key).collect();
        desired
            .iter()
            .filter(|n| achieved_names.contains(&node_key(n)))
            .collect()
    } else {
        Vec::new()
    };

    NodePlan {
        update,
        install: difference_by(desired, achieved, node_key),
        remove: difference_by(achieved, desired, node_key),
        repair_existing: false,
    }
}

// ============================================================================
// Model plan
// ============================================================================

/// A model file to relocate instead of fetching again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelMove<'a> {
    pub from: &'a Model,
    pub to: &'a Model,
}

/// Queued model actions, in execution order: move, remove, download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelPlan<'a> {
    pub moves: Vec<ModelMove<'a>>,
    pub remove: Vec<&'a Model>,
    pub download: Vec<&'a Model>,
}

impl<'a> ModelPlan<'a> {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty() && self.remove.is_empty() && self.download.is_empty()
    }

    pub fn actions(&self) -> Vec<Action<&'a Model>> {
        let moves = self.moves.iter().map(|m| Action::Move {
            from: m.from,
            to: m.to,
        });
        let remove = self.remove.iter().map(|&m| Action::Remove { resource: m });
        let download = self.download.iter().map(|&m| Action::Install { resource: m });
        moves.chain(remove).chain(download).collect()
    }
}

/// Plan model actions, matching snapshots by URL.
///
/// An achieved file at exactly the desired path needs nothing. Otherwise an
/// achieved file with the same URL is moved into place, and only a URL never
/// seen before is downloaded. Achieved files left unclaimed are removed,
/// which clears the way when a new URL is downloaded to an old path.
pub fn plan_models<'a>(desired: &'a [Model], achieved: &'a [Model]) -> ModelPlan<'a> {
    let mut claimed = vec![false; achieved.len()];

    let exact: HashMap<(&str, &Path), usize> = achieved
        .iter()
        .enumerate()
        .map(|(i, m)| ((m.url.as_str(), m.path.as_path()), i))
        .collect();
    let mut pending = Vec::new();
    for model in desired {
        match exact.get(&(model.url.as_str(), model.path.as_path())) {
            Some(&i) => claimed[i] = true,
            None => pending.push(model),
        }
    }

    let mut moves = Vec::new();
    let mut download = Vec::new();
    for model in pending {
        let source = achieved
            .iter()
            .enumerate()
            .find(|(i, prev)| !claimed[*i] && prev.url == model.url);
        match source {
            Some((i, from)) => {
                claimed[i] = true;
                moves.push(ModelMove { from, to: model });
            }
            None => download.push(model),
        }
    }

    let remove = achieved
        .iter()
        .zip(&claimed)
        .filter(|(_, claimed)| !**claimed)
        .map(|(m, _)| m)
        .collect();

    ModelPlan {
        moves,
        remove,
        download,
    }
}
