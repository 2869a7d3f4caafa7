//! Single-transfer download loop.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::retry::{LogCallback, with_retry};
use crate::types::{DownloadRequest, Gid, RetryConfig, TransferState};
use declarative::ApplyContext;
use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Drives one transfer at a time through a [`Backend`].
///
/// Each attempt queues the URL, then polls on a fixed interval until the
/// transfer completes or stops. A failed transfer is cancelled and its
/// partial files deleted before the next attempt. Rejected credentials end
/// the download immediately.
pub struct Downloader {
    backend: Box<dyn Backend>,
    retry: RetryConfig,
    poll_interval: Duration,
}

impl Downloader {
    /// Create a downloader with three attempts two seconds apart, polling
    /// every second.
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            retry: RetryConfig::default(),
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Override the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Download `request`, retrying transient failures.
    pub fn download(&self, request: &DownloadRequest, ctx: &ApplyContext) -> Result<()> {
        fs::create_dir_all(&request.dir).map_err(|e| Error::io(&request.dir, e))?;

        let callback = LogCallback { ctx: *ctx };
        let result = with_retry(&self.retry, Some(&callback), || self.attempt(request, ctx));

        match &result {
            Ok(()) => log::info!(
                "{ctx}Downloaded: {} -> {}",
                request.filename,
                request.dir.display()
            ),
            Err(e) if e.is_retryable() => {
                log::error!("{ctx}Max retries reached for {}: {e}", request.filename);
            }
            Err(_) => {}
        }
        result
    }

    fn attempt(&self, request: &DownloadRequest, ctx: &ApplyContext) -> Result<()> {
        let gid = self.backend.add(request)?;
        log::debug!("{ctx}queued {} as {gid}", request.url);

        loop {
            let status = self.backend.status(&gid)?;
            match status.state {
                TransferState::Complete => return Ok(()),
                TransferState::Error => {
                    self.discard(&gid, request, ctx);
                    return Err(Error::from_transfer(status.error_code, status.error_message));
                }
                TransferState::Removed => {
                    self.discard(&gid, request, ctx);
                    return Err(Error::TransferRemoved);
                }
                TransferState::Active | TransferState::Waiting | TransferState::Paused => {
                    log::info!("{ctx}{}: {}", request.filename, status.progress_line());
                }
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Cancel a stopped transfer and delete whatever it left on disk.
    fn discard(&self, gid: &Gid, request: &DownloadRequest, ctx: &ApplyContext) {
        if let Err(e) = self.backend.remove(gid) {
            log::debug!("{ctx}could not remove transfer {gid}: {e}");
        }
        for path in [request.destination(), request.control_file()] {
            remove_if_exists(&path, ctx);
        }
    }
}

fn remove_if_exists(path: &Path, ctx: &ApplyContext) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("{ctx}removed {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("{ctx}could not remove {}: {e}", path.display()),
    }
}
