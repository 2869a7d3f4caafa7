//! Reconciliation engine
//!
//! 1. Planning - diff the desired config against the achieved snapshot
//! 2. Executing - apply each queue as a phase, collecting failures
//! 3. Recording - derive the snapshot to persist for the next boot

pub mod executor;
pub mod planner;

pub use executor::{
    LazyDownloader, ModelReport, NodeReport, achieved_models_after, achieved_nodes_after,
    reconcile_models, reconcile_nodes,
};
pub use planner::{
    achieved_models, achieved_nodes, desired_models, desired_nodes, plan_models, plan_nodes,
};
