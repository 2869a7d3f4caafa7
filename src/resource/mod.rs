//! The two resource kinds a boot manages
//!
//! Both are built either from a config entry (desired state) or from a
//! record of the previous boot (achieved state), and both implement
//! [`declarative::Resource`] for inspection. Their lifecycle operations take the
//! collaborators they need explicitly.

mod model;
mod node;

pub use model::Model;
pub use node::{Node, NodeSource, NodeTools};

use thiserror::Error;

/// A config entry that cannot become a resource
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("Invalid node config. Missing 'node_id' or 'url'")]
    MissingIdentity,

    #[error("Invalid git URL: {0}")]
    InvalidGitUrl(String),

    #[error("Invalid model URL: {0}")]
    InvalidModelUrl(String),

    #[error("Invalid model config: '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error(transparent)]
    Malformed(#[from] toml::de::Error),
}
