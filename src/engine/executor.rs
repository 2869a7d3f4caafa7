//! Plan execution
//!
//! Each queue runs as one phase through [`declarative::run_phase`], so every
//! log line of an action carries its `[k/total]` prefix and one failure never
//! stops the rest of the batch.

use super::planner::{ModelPlan, NodePlan, model_path_key, node_key};
use crate::resource::{Model, Node, NodeTools};
use crate::settings::Settings;
use crate::ui;
use anyhow::{Result, anyhow};
use declarative::{Applied, ApplyResult, dedup_by_key, difference_by, run_phase, summarize};
use std::cell::OnceCell;
use transfer::{Aria2Client, Downloader};

// ============================================================================
// Reports
// ============================================================================

/// What happened to the nodes of one boot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeReport {
    pub installed: usize,
    pub existing: usize,
    pub removed: usize,
    /// Nodes updated, when the update phase ran
    pub updated: Option<usize>,
    pub update_failed: usize,
    /// Install and remove failures, retried next boot
    pub failed: Vec<Node>,
}

/// What happened to the models of one boot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReport {
    pub downloaded: usize,
    pub existing: usize,
    pub removed: usize,
    pub moved: usize,
    /// Failures, retried next boot
    pub failed: Vec<Model>,
    /// Sources of failed moves, still where the previous boot left them
    pub retained: Vec<Model>,
}

impl NodeReport {
    /// Desired nodes that did not fail; failed removals are not counted
    pub fn succeeded(&self, desired: &[Node]) -> usize {
        difference_by(desired, &self.failed, node_key).len()
    }
}

impl ModelReport {
    /// Desired models that did not fail; failed removals are not counted
    pub fn succeeded(&self, desired: &[Model]) -> usize {
        difference_by(desired, &self.failed, model_path_key).len()
    }
}

// ============================================================================
// Downloader
// ============================================================================

type DownloaderFactory<'a> = Box<dyn Fn() -> transfer::Result<Downloader> + 'a>;

/// A downloader created on first use.
///
/// The transfer daemon is only contacted (or launched) when a download is
/// actually needed. If that fails, every download of the run fails with the
/// same reason.
pub struct LazyDownloader<'a> {
    factory: DownloaderFactory<'a>,
    cell: OnceCell<std::result::Result<Downloader, String>>,
}

impl<'a> LazyDownloader<'a> {
    pub fn new(factory: impl Fn() -> transfer::Result<Downloader> + 'a) -> Self {
        Self {
            factory: Box::new(factory),
            cell: OnceCell::new(),
        }
    }

    /// Connect to the aria2 daemon described by `settings`, launching it if needed
    pub fn from_settings(settings: &'a Settings) -> Self {
        Self::new(move || {
            let client = Aria2Client::connect_or_launch(&settings.daemon)?;
            Ok(Downloader::new(Box::new(client)).with_retry(settings.download_retry.clone()))
        })
    }

    pub fn get(&self) -> Result<&Downloader> {
        self.cell
            .get_or_init(|| (self.factory)().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|e| anyhow!("Download daemon unavailable: {e}"))
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// Run the node plan: update, then install, then remove
pub fn reconcile_nodes(plan: &NodePlan<'_>, tools: NodeTools<'_>) -> NodeReport {
    let mut report = NodeReport::default();

    if !plan.update.is_empty() {
        log::info!("Updating {} nodes:", plan.update.len());
        ui::log_tree(log::Level::Info, &plan.update);
        let applied = run_phase(plan.update.iter().copied(), |node, ctx| {
            node.update(tools, ctx)
        });
        let summary = summarize(&applied);
        report.updated = Some(summary.succeeded);
        report.update_failed = summary.failed;
    }

    if !plan.install.is_empty() {
        log::info!("Installing {} nodes:", plan.install.len());
        ui::log_tree(log::Level::Info, &plan.install);
        let applied = run_phase(plan.install.iter().copied(), |node, ctx| {
            node.install(plan.repair_existing, tools, ctx)
        });
        let summary = summarize(&applied);
        report.installed += summary.succeeded;
        report.existing += summary.no_op;
        report.failed.extend(failures(&applied));
    }

    if !plan.remove.is_empty() {
        log::info!("Removing {} nodes:", plan.remove.len());
        ui::log_tree(log::Level::Info, &plan.remove);
        let applied = run_phase(plan.remove.iter().copied(), |node, ctx| {
            node.remove(tools, ctx)
        });
        report.removed += summarize(&applied).succeeded;
        report.failed.extend(failures(&applied));
    }

    report
}

// ============================================================================
// Models
// ============================================================================

/// Run the model plan: move, then remove, then download.
///
/// A move whose source has vanished falls through to the download queue so
/// the desired file still ends up on disk.
pub fn reconcile_models(
    plan: &ModelPlan<'_>,
    downloader: &LazyDownloader<'_>,
    settings: &Settings,
) -> ModelReport {
    let mut report = ModelReport::default();
    let mut download: Vec<&Model> = plan.download.clone();

    if !plan.moves.is_empty() {
        log::info!("Moving {} models:", plan.moves.len());
        let lines: Vec<String> = plan
            .moves
            .iter()
            .map(|m| format!("{} -> {}", m.from.path.display(), m.to.path.display()))
            .collect();
        ui::log_tree(log::Level::Info, &lines);

        let applied = run_phase(&plan.moves, |m, ctx| m.to.move_from(m.from, ctx));
        for entry in &applied {
            match &entry.result {
                ApplyResult::Success => report.moved += 1,
                ApplyResult::NoOp if !entry.item.to.path.is_file() => {
                    download.push(entry.item.to);
                }
                ApplyResult::NoOp => report.existing += 1,
                ApplyResult::Failed { .. } => {
                    report.failed.push(entry.item.to.clone());
                    report.retained.push(entry.item.from.clone());
                }
            }
        }
    }

    if !plan.remove.is_empty() {
        log::info!("Removing {} models:", plan.remove.len());
        ui::log_tree(log::Level::Info, &plan.remove);
        let applied = run_phase(plan.remove.iter().copied(), |model, ctx| model.remove(ctx));
        report.removed += summarize(&applied).succeeded;
        report.failed.extend(failures(&applied));
    }

    if !download.is_empty() {
        log::info!("Downloading {} models:", download.len());
        ui::log_tree(log::Level::Info, &download);
        let applied = run_phase(download.iter().copied(), |model, ctx| {
            let downloader = downloader.get()?;
            model.download(downloader, settings, ctx)
        });
        let summary = summarize(&applied);
        report.downloaded += summary.succeeded;
        report.existing += summary.no_op;
        report.failed.extend(failures(&applied));
    }

    report
}

fn failures<T: Clone>(applied: &[Applied<'_, T>]) -> Vec<T> {
    applied
        .iter()
        .filter(|a| a.result.is_failure())
        .map(|a| a.item.clone())
        .collect()
}

// ============================================================================
// Achieved snapshot
// ============================================================================

/// Nodes to record as achieved: everything desired that did not fail
pub fn achieved_nodes_after(desired: &[Node], report: &NodeReport) -> Vec<Node> {
    difference_by(desired, &report.failed, node_key)
        .into_iter()
        .cloned()
        .collect()
}

/// Models to record as achieved: everything desired that did not fail, plus
/// the untouched sources of failed moves so the move is retried
pub fn achieved_models_after(desired: &[Model], report: &ModelReport) -> Vec<Model> {
    let kept = difference_by(desired, &report.failed, model_path_key)
        .into_iter()
        .chain(&report.retained)
        .cloned();
    dedup_by_key(kept, model_path_key).kept
}
