//! # transfer
//!
//! Resumable file downloads driven through an aria2 daemon.
//!
//! This crate provides:
//! - [`backend`]: the [`Backend`] trait over the daemon's control channel,
//!   the JSON-RPC implementation [`Aria2Client`] and an in-memory
//!   [`MockBackend`]
//! - [`Downloader`]: one transfer at a time, polled on a fixed interval until
//!   it completes or fails, with bounded fixed-interval retries
//! - [`retry`]: the retry loop, which gives up immediately on errors that
//!   retrying cannot fix (rejected credentials)
//!
//! ## Example
//!
//! ```no_run
//! use declarative::ApplyContext;
//! use transfer::{Aria2Client, DaemonOptions, DownloadRequest, Downloader};
//!
//! let client = Aria2Client::connect_or_launch(&DaemonOptions::default())
//!     .expect("aria2 unavailable");
//! let downloader = Downloader::new(Box::new(client));
//!
//! let request = DownloadRequest::new(
//!     "https://huggingface.co/org/repo/resolve/main/model.safetensors",
//!     "/workspace/comfyui/models/checkpoints",
//!     "model.safetensors",
//! );
//! downloader
//!     .download(&request, &ApplyContext::detached())
//!     .expect("download failed");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod downloader;
pub mod error;
pub mod retry;
pub mod types;

pub use backend::aria2::{Aria2Client, DaemonOptions};
pub use backend::{Backend, MockBackend, MockOutcome};
pub use downloader::Downloader;
pub use error::{Error, ErrorCategory, Result};
pub use retry::{LogCallback, RetryCallback, with_retry};
pub use types::{DownloadRequest, Gid, RetryConfig, TransferState, TransferStatus};
