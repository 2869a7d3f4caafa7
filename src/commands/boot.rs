//! The boot sequence
//!
//! load config and snapshot, pre-init hooks, reconcile nodes, reconcile
//! models, write the snapshot, post-init hooks, summary, launch.

use crate::config::{BootConfig, ConfigLoader};
use crate::engine::{
    self, LazyDownloader, ModelReport, NodeReport, achieved_models_after, achieved_nodes_after,
};
use crate::launcher::{self, Launcher};
use crate::resource::{Model, Node, NodeTools};
use crate::runner::ScriptRunner;
use crate::settings::Settings;
use crate::state::{BootState, StateStore};
use crate::ui;
use anyhow::Result;
use declarative::Resource;
use nodekit::{CliManager, ExecOptions, GitCli};

/// What reconciling one category amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<R> {
    /// Turned off by its toggle; prior records carried over
    Disabled,
    /// Desired and achieved already agree
    Unchanged,
    /// Actions ran against `total` desired resources, `succeeded` of them
    /// ending in place
    Reconciled {
        total: usize,
        succeeded: usize,
        report: R,
    },
}

/// Result of one reconciliation, ready to be persisted and summarized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub state: BootState,
    pub nodes: Outcome<NodeReport>,
    pub models: Outcome<ModelReport>,
}

/// Run the boot sequence. Returns the process exit code.
pub fn run(settings: &Settings, launch: bool) -> Result<i32> {
    launcher::install_signal_handlers();

    let config = ConfigLoader::new(&settings.config_dir)
        .include(settings.config_include.as_deref())
        .exclude(settings.config_exclude.as_deref())
        .load()?;
    let store = StateStore::new(&settings.state_path);
    let prior = store.load();

    let envs = settings.child_envs();
    let scripts = ScriptRunner::new(&settings.python, ExecOptions::with_envs(envs.clone()));

    log::info!("Executing pre-init scripts...");
    scripts.run_dir(&settings.pre_init_dir());

    let manager = CliManager::new(&settings.python, &settings.manager_dir).with_envs(envs);
    let vcs = GitCli::new();
    let tools = NodeTools {
        manager: &manager,
        vcs: &vcs,
        scripts: &scripts,
        network: &settings.network,
    };
    let downloader = LazyDownloader::from_settings(settings);

    let result = reconcile(settings, tools, &downloader, &config, &prior);
    if let Err(e) = store.save(&result.state) {
        log::error!("Failed to write state {}: {e:#}", store.path().display());
    }

    log::info!("Executing post-init scripts...");
    scripts.run_dir(&settings.post_init_dir());

    log_summary(&result);
    if let Some(signal) = launcher::take_ignored_signal() {
        log::warn!("Received signal {signal} before ComfyUI was running, ignored");
    }

    if !launch {
        return Ok(0);
    }
    log::info!("Launching ComfyUI...");
    Launcher::from_settings(settings).run()
}

/// Reconcile both categories and compute the snapshot to persist
pub fn reconcile(
    settings: &Settings,
    tools: NodeTools<'_>,
    downloader: &LazyDownloader<'_>,
    config: &BootConfig,
    prior: &BootState,
) -> Reconciled {
    let mut state = BootState::default();

    let nodes = if settings.toggles.init_node {
        let desired = engine::desired_nodes(&config.custom_nodes, settings);
        let achieved = engine::achieved_nodes(&prior.custom_nodes, settings);
        let plan = engine::plan_nodes(&desired, &achieved, settings.toggles.update_node);
        let outcome = if plan.is_empty() {
            log::info!("Nodes: no config changes, reconciliation skipped");
            Outcome::Unchanged
        } else {
            let report = engine::reconcile_nodes(&plan, tools);
            Outcome::Reconciled {
                total: desired.len(),
                succeeded: report.succeeded(&desired),
                report,
            }
        };
        let kept = match &outcome {
            Outcome::Reconciled { report, .. } => achieved_nodes_after(&desired, report),
            _ => desired,
        };
        state.custom_nodes = kept.iter().map(Node::to_record).collect();
        outcome
    } else {
        log::info!("Nodes: INIT_NODE is off, skipped");
        state.custom_nodes = prior.custom_nodes.clone();
        Outcome::Disabled
    };

    let models = if settings.toggles.init_model {
        let desired = engine::desired_models(&config.models, settings);
        let achieved = engine::achieved_models(&prior.models, settings);
        let plan = engine::plan_models(&desired, &achieved);
        let outcome = if plan.is_empty() {
            log::info!("Models: no config changes, reconciliation skipped");
            Outcome::Unchanged
        } else {
            let report = engine::reconcile_models(&plan, downloader, settings);
            Outcome::Reconciled {
                total: desired.len(),
                succeeded: report.succeeded(&desired),
                report,
            }
        };
        let kept = match &outcome {
            Outcome::Reconciled { report, .. } => achieved_models_after(&desired, report),
            _ => desired,
        };
        state.models = kept.iter().map(Model::to_record).collect();
        outcome
    } else {
        log::info!("Models: INIT_MODEL is off, skipped");
        state.models = prior.models.clone();
        Outcome::Disabled
    };

    Reconciled {
        state,
        nodes,
        models,
    }
}

fn log_summary(result: &Reconciled) {
    log::info!("--------------------");

    if let Outcome::Reconciled {
        total,
        succeeded,
        report,
    } = &result.nodes
    {
        let failed = report.failed.len();
        log::info!("{}", ui::summary_line("Nodes", *succeeded, *total));
        let mut counts = vec![
            ("installed", report.installed),
            ("removed", report.removed),
            ("existing", report.existing),
        ];
        if let Some(updated) = report.updated {
            counts.push(("updated", updated));
            counts.push(("update failed", report.update_failed));
        }
        ui::log_tree(log::Level::Info, &ui::summary_details(&counts));
        if failed > 0 {
            log::warn!("Nodes: {failed} failed to process, will retry on next boot:");
            ui::log_tree(log::Level::Warn, &failure_lines(&report.failed));
        }
    }

    if let Outcome::Reconciled {
        total,
        succeeded,
        report,
    } = &result.models
    {
        let failed = report.failed.len();
        log::info!("{}", ui::summary_line("Models", *succeeded, *total));
        let counts = [
            ("downloaded", report.downloaded),
            ("removed", report.removed),
            ("moved", report.moved),
            ("existing", report.existing),
        ];
        ui::log_tree(log::Level::Info, &ui::summary_details(&counts));
        if failed > 0 {
            log::warn!("Models: {failed} failed to process, will retry on next boot:");
            ui::log_tree(log::Level::Warn, &failure_lines(&report.failed));
        }
    }

    log::info!("--------------------");
}

fn failure_lines<R: Resource>(failed: &[R]) -> Vec<String> {
    failed.iter().map(Resource::description).collect()
}
