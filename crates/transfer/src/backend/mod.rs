//! Backend traits and implementations for the transfer daemon.
//!
//! The [`Backend`] trait covers the daemon's control channel: queue a single
//! URL, poll it, cancel it. [`aria2::Aria2Client`] talks JSON-RPC to a real
//! aria2 process.
//!
//! # Testing
//!
//! Use [`MockBackend`] for testing without a daemon or network access:
//!
//! ```
//! use transfer::backend::{Backend, MockBackend, MockOutcome};
//! use transfer::{DownloadRequest, TransferState};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mock = MockBackend::new();
//! mock.push_outcome("https://example.com/a.bin", MockOutcome::Removed);
//!
//! let gid = mock.add(&DownloadRequest::new("https://example.com/a.bin", dir.path(), "a.bin")).unwrap();
//! assert_eq!(mock.status(&gid).unwrap().state, TransferState::Active);
//! assert_eq!(mock.status(&gid).unwrap().state, TransferState::Removed);
//! ```

pub mod aria2;

use crate::error::{Error, Result};
use crate::types::{DownloadRequest, Gid, TransferState, TransferStatus};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::sync::{Arc, Mutex};

/// Control channel of a transfer daemon.
pub trait Backend: Send + Sync {
    /// Queue a transfer and return its identifier.
    fn add(&self, request: &DownloadRequest) -> Result<Gid>;

    /// Fetch the current status of a transfer.
    fn status(&self, gid: &Gid) -> Result<TransferStatus>;

    /// Cancel a transfer and forget its result.
    fn remove(&self, gid: &Gid) -> Result<()>;

    /// Forget every finished, failed or removed transfer.
    fn purge(&self) -> Result<()>;
}

/// Scripted result of one mock transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Write the file and complete
    Complete,
    /// Stop in the error state
    Fail {
        /// Daemon error code
        code: String,
        /// Daemon error message
        message: String,
    },
    /// Report the transfer as removed
    Removed,
}

impl MockOutcome {
    /// An error outcome with a generic code.
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail {
            code: "1".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug)]
struct MockTransfer {
    request: DownloadRequest,
    outcome: MockOutcome,
    polls: u32,
}

/// Mock backend for testing without a daemon.
///
/// Each transfer reports `active` on its first poll, leaving a partial file
/// and control file on disk, then settles on its scripted outcome. URLs
/// without a script complete successfully.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    scripts: Arc<Mutex<HashMap<String, VecDeque<MockOutcome>>>>,
    transfers: Arc<Mutex<HashMap<Gid, MockTransfer>>>,
    requests: Arc<Mutex<Vec<DownloadRequest>>>,
    removed: Arc<Mutex<Vec<Gid>>>,
    purges: Arc<Mutex<u32>>,
}

impl MockBackend {
    /// Create a new empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next transfer of `url`.
    pub fn push_outcome(&self, url: &str, outcome: MockOutcome) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Every request queued so far.
    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Transfers cancelled so far.
    pub fn removed(&self) -> Vec<Gid> {
        self.removed.lock().unwrap().clone()
    }

    /// Number of purge calls.
    pub fn purge_count(&self) -> u32 {
        *self.purges.lock().unwrap()
    }
}

impl Backend for MockBackend {
    fn add(&self, request: &DownloadRequest) -> Result<Gid> {
        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(MockOutcome::Complete);

        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let gid = Gid(format!("{:016x}", requests.len()));

        self.transfers.lock().unwrap().insert(
            gid.clone(),
            MockTransfer {
                request: request.clone(),
                outcome,
                polls: 0,
            },
        );
        Ok(gid)
    }

    fn status(&self, gid: &Gid) -> Result<TransferStatus> {
        let mut transfers = self.transfers.lock().unwrap();
        let transfer = transfers
            .get_mut(gid)
            .ok_or_else(|| Error::Rpc {
                code: 1,
                message: format!("GID {gid} is not found"),
            })?;
        transfer.polls += 1;

        let request = &transfer.request;
        if transfer.polls == 1 {
            fs::create_dir_all(&request.dir)?;
            fs::write(request.destination(), b"partial")?;
            fs::write(request.control_file(), b"")?;
            return Ok(TransferStatus {
                completed: 7,
                total: 14,
                speed: 7,
                ..TransferStatus::new(TransferState::Active)
            });
        }

        match &transfer.outcome {
            MockOutcome::Complete => {
                fs::write(request.destination(), request.url.as_bytes())?;
                let _ = fs::remove_file(request.control_file());
                Ok(TransferStatus {
                    completed: 14,
                    total: 14,
                    ..TransferStatus::new(TransferState::Complete)
                })
            }
            MockOutcome::Fail { code, message } => Ok(TransferStatus {
                error_code: Some(code.clone()),
                error_message: Some(message.clone()),
                ..TransferStatus::new(TransferState::Error)
            }),
            MockOutcome::Removed => Ok(TransferStatus::new(TransferState::Removed)),
        }
    }

    fn remove(&self, gid: &Gid) -> Result<()> {
        self.transfers.lock().unwrap().remove(gid);
        self.removed.lock().unwrap().push(gid.clone());
        Ok(())
    }

    fn purge(&self) -> Result<()> {
        *self.purges.lock().unwrap() += 1;
        Ok(())
    }
}
