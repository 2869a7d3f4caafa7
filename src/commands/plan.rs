//! Dry run: show the actions the next boot would take

use crate::config::{BootConfig, ConfigLoader};
use crate::engine;
use crate::resource::{Model, Node};
use crate::settings::Settings;
use crate::state::{BootState, StateStore};
use crate::ui;
use anyhow::{Context, Result};
use declarative::Action;
use serde::Serialize;

/// Planned actions per category; a disabled category has no entry
#[derive(Debug, Serialize)]
pub struct PlanReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_nodes: Option<Vec<Action<&'a Node>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<Action<&'a Model>>>,
}

impl PlanReport<'_> {
    pub fn is_empty(&self) -> bool {
        self.custom_nodes.as_ref().is_none_or(Vec::is_empty)
            && self.models.as_ref().is_none_or(Vec::is_empty)
    }
}

/// Desired and achieved resources of both categories
#[derive(Debug, Default)]
pub struct Snapshots {
    desired_nodes: Vec<Node>,
    achieved_nodes: Vec<Node>,
    desired_models: Vec<Model>,
    achieved_models: Vec<Model>,
}

impl Snapshots {
    pub fn new(settings: &Settings, config: &BootConfig, prior: &BootState) -> Self {
        Self {
            desired_nodes: engine::desired_nodes(&config.custom_nodes, settings),
            achieved_nodes: engine::achieved_nodes(&prior.custom_nodes, settings),
            desired_models: engine::desired_models(&config.models, settings),
            achieved_models: engine::achieved_models(&prior.models, settings),
        }
    }

    pub fn plan(&self, settings: &Settings) -> PlanReport<'_> {
        let toggles = &settings.toggles;
        PlanReport {
            custom_nodes: toggles.init_node.then(|| {
                engine::plan_nodes(&self.desired_nodes, &self.achieved_nodes, toggles.update_node)
                    .actions()
            }),
            models: toggles.init_model.then(|| {
                engine::plan_models(&self.desired_models, &self.achieved_models).actions()
            }),
        }
    }
}

pub fn run(settings: &Settings, json: bool) -> Result<i32> {
    let config = ConfigLoader::new(&settings.config_dir)
        .include(settings.config_include.as_deref())
        .exclude(settings.config_exclude.as_deref())
        .load()?;
    let prior = StateStore::new(&settings.state_path).load();
    let snapshots = Snapshots::new(settings, &config, &prior);
    let report = snapshots.plan(settings);

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize plan")?;
        println!("{out}");
        return Ok(0);
    }

    ui::header("comfyboot plan");
    ui::kv("config", &settings.config_dir.display().to_string());
    ui::kv("state", &settings.state_path.display().to_string());

    print_category("Custom nodes", report.custom_nodes.as_deref());
    print_category("Models", report.models.as_deref());

    println!();
    if report.is_empty() {
        ui::success("Nothing to do");
    } else {
        ui::info("Run `comfyboot reconcile` or `comfyboot run` to apply");
    }
    Ok(0)
}

fn print_category<R: std::fmt::Display>(title: &str, actions: Option<&[Action<R>]>) {
    ui::section(title);
    match actions {
        None => ui::dim("disabled"),
        Some([]) => ui::dim("no changes"),
        Some(actions) => actions.iter().for_each(ui::action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ModelRecord;
    use declarative::ActionKind;
    use tempfile::TempDir;

    fn config(text: &str) -> BootConfig {
        let table: toml::Table = toml::from_str(text).unwrap();
        let list = |key: &str| {
            table
                .get(key)
                .and_then(toml::Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        BootConfig {
            custom_nodes: list("custom_nodes"),
            models: list("models"),
        }
    }

    #[test]
    fn test_plan_lists_actions_per_category() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::for_root(temp.path());
        let config = config(
            r#"
            [[custom_nodes]]
            node_id = "a"

            [[models]]
            url = "https://example.com/u1"
            filename = "m.bin"
            dir = "models/new"
            "#,
        );
        let prior = BootState {
            models: vec![ModelRecord {
                url: "https://example.com/u1".to_string(),
                filename: "m.bin".to_string(),
                dir: "models/old".to_string(),
                path: settings.app_root.join("models/old/m.bin"),
            }],
            ..BootState::default()
        };

        let snapshots = Snapshots::new(&settings, &config, &prior);
        let report = snapshots.plan(&settings);
        let kinds = |actions: &[Action<&Model>]| actions.iter().map(Action::kind).collect::<Vec<_>>();

        assert_eq!(report.custom_nodes.as_ref().unwrap().len(), 1);
        assert_eq!(kinds(report.models.as_deref().unwrap()), vec![ActionKind::Move]);
        assert!(!report.is_empty());
    }

    #[test]
    fn test_plan_json_omits_disabled_category() {
        let temp = TempDir::new().unwrap();
        let mut settings = Settings::for_root(temp.path());
        settings.toggles.init_model = false;
        let config = config("[[custom_nodes]]\nnode_id = \"a\"\n");

        let snapshots = Snapshots::new(&settings, &config, &BootState::default());
        let report = snapshots.plan(&settings);
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();

        assert!(json.get("models").is_none());
        assert_eq!(json["custom_nodes"][0]["action"], "install");
        assert_eq!(json["custom_nodes"][0]["resource"]["name"], "a");
    }

    #[test]
    fn test_plan_empty_config_is_empty() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::for_root(temp.path());
        let snapshots = Snapshots::new(&settings, &BootConfig::default(), &BootState::default());
        assert!(snapshots.plan(&settings).is_empty());
    }
}
