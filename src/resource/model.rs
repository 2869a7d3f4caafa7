//! Model file resource

use super::EntryError;
use crate::settings::Settings;
use crate::state::ModelRecord;
use anyhow::{Context, Result};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use transfer::types::control_file_for;
use transfer::{DownloadRequest, Downloader};
use url::Url;

/// Raw `[[models]]` entry
#[derive(Debug, Deserialize)]
struct ModelEntry {
    url: String,
    filename: String,
    dir: String,
}

/// A model file.
///
/// Snapshots deduplicate models by `path`; across snapshots the same model
/// is recognized by `url`, which is what lets a file be moved instead of
/// fetched again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    pub url: String,
    pub filename: String,
    pub dir: String,
    pub path: PathBuf,
}

impl Model {
    fn new(url: String, filename: String, dir: String, settings: &Settings) -> Self {
        Self {
            path: settings.app_root.join(&dir).join(&filename),
            url,
            filename,
            dir,
        }
    }

    /// Build a desired model from a `[[models]]` entry
    pub fn from_entry(value: &toml::Value, settings: &Settings) -> Result<Self, EntryError> {
        let entry: ModelEntry = value.clone().try_into()?;

        let url = entry.url.trim().to_string();
        let has_host = Url::parse(&url).is_ok_and(|u| u.host_str().is_some());
        if !has_host {
            return Err(EntryError::InvalidModelUrl(url));
        }
        let filename = entry.filename.trim().to_string();
        if filename.is_empty() {
            return Err(EntryError::EmptyField("filename"));
        }
        Ok(Self::new(url, filename, entry.dir.trim().to_string(), settings))
    }

    /// Rebuild an achieved model from the previous boot's record
    pub fn from_record(record: &ModelRecord, settings: &Settings) -> Self {
        Self::new(
            record.url.clone(),
            record.filename.clone(),
            record.dir.clone(),
            settings,
        )
    }

    pub fn to_record(&self) -> ModelRecord {
        ModelRecord {
            url: self.url.clone(),
            filename: self.filename.clone(),
            dir: self.dir.clone(),
            path: self.path.clone(),
        }
    }

    fn target_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map_or_else(|| PathBuf::from(&self.dir), PathBuf::from)
    }

    /// Remove leftovers a previous boot may have abandoned next to the file
    fn purge_leftovers(&self, ctx: &ApplyContext) -> Result<bool> {
        let cache = self.target_dir().join(".cache");
        if cache.is_dir() {
            log::warn!("{ctx}Found download cache directory: {}, removing...", cache.display());
            fs::remove_dir_all(&cache)
                .with_context(|| format!("Failed to remove {}", cache.display()))?;
        }

        let control = control_file_for(&self.path);
        if !control.exists() {
            return Ok(false);
        }
        log::warn!("{ctx}Found incomplete download: {}, removing...", self.path.display());
        fs::remove_file(&control)
            .with_context(|| format!("Failed to remove {}", control.display()))?;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to remove {}", self.path.display()));
            }
        }
        Ok(true)
    }

    /// Fetch the file if it is not already present
    pub fn download(
        &self,
        downloader: &Downloader,
        settings: &Settings,
        ctx: &ApplyContext,
    ) -> Result<ApplyResult> {
        if self.inspect(&(), ctx)?.is_present() {
            log::info!("{ctx}{} already exists in {}. Skipped.", self.filename, self.dir);
            return Ok(ApplyResult::NoOp);
        }

        log::info!("{ctx}Downloading model: {}", self.filename);
        let transfer = settings.transfer_url(&self.url);
        let request = DownloadRequest::new(transfer.url, self.target_dir(), &self.filename)
            .with_header(transfer.header);
        match downloader.download(&request, ctx) {
            Ok(()) => {
                log::info!("{ctx}Downloaded model: {}", self.filename);
                Ok(ApplyResult::Success)
            }
            Err(e) => {
                let reason = format!("{e}. {}", e.category().advice());
                log::error!("{ctx}Failed to download model {}: {reason}", self.filename);
                Ok(ApplyResult::failed(reason))
            }
        }
    }

    /// Delete the file
    pub fn remove(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        if self.inspect(&(), ctx)?.is_absent() {
            log::info!("{ctx}{} not found in {}. Skipped.", self.filename, self.dir);
            return Ok(ApplyResult::NoOp);
        }
        log::info!("{ctx}Removing model: {}", self.filename);
        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove model {}", self.path.display()))?;
        log::info!("{ctx}Removed model: {}", self.filename);
        Ok(ApplyResult::Success)
    }

    /// Relocate the file of `from` to this model's path
    pub fn move_from(&self, from: &Self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let (src, dst) = (&from.path, &self.path);
        if src == dst {
            log::warn!("{ctx}Source and destination are the same. Skipped.");
            return Ok(ApplyResult::NoOp);
        }
        if from.inspect(&(), ctx)?.is_absent() {
            log::warn!("{ctx}{} not found. Skipped.", src.display());
            return Ok(ApplyResult::NoOp);
        }
        if self.inspect(&(), ctx)?.is_present() {
            log::warn!("{ctx}{} already exists. Skipped.", dst.display());
            return Ok(ApplyResult::NoOp);
        }

        log::info!("{ctx}Moving file: {} -> {}", src.display(), dst.display());
        let dir = self.target_dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        match fs::rename(src, dst) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                fs::copy(src, dst).with_context(|| {
                    format!("Failed to copy {} -> {}", src.display(), dst.display())
                })?;
                fs::remove_file(src)
                    .with_context(|| format!("Failed to remove {}", src.display()))?;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to move file: {} -> {}", src.display(), dst.display())
                });
            }
        }
        log::info!("{ctx}Moved file: {} -> {}", src.display(), dst.display());
        Ok(ApplyResult::Success)
    }
}

impl Resource for Model {
    type Env = ();

    fn id(&self) -> String {
        self.filename.clone()
    }

    fn resource_type(&self) -> &'static str {
        "model"
    }

    fn inspect(&self, _env: &(), ctx: &ApplyContext) -> Result<ResourceState> {
        if self.purge_leftovers(ctx)? {
            return Ok(ResourceState::Absent);
        }
        Ok(if self.path.is_file() {
            ResourceState::Present
        } else {
            ResourceState::Absent
        })
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.filename, self.dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Credentials;
    use std::time::Duration;
    use tempfile::TempDir;
    use transfer::{MockBackend, MockOutcome, RetryConfig};

    const URL: &str = "https://huggingface.co/org/repo/resolve/main/a.safetensors";

    fn setup() -> (TempDir, Settings) {
        let temp = TempDir::new().unwrap();
        let settings = Settings::for_root(temp.path());
        (temp, settings)
    }

    fn model(settings: &Settings, url: &str, dir: &str) -> Model {
        let value: toml::Value = toml::from_str(&format!(
            "url = \"{url}\"\nfilename = \"a.safetensors\"\ndir = \"{dir}\""
        ))
        .unwrap();
        Model::from_entry(&value, settings).unwrap()
    }

    fn downloader(backend: &MockBackend) -> Downloader {
        Downloader::new(Box::new(backend.clone()))
            .with_retry(RetryConfig::fixed(2, Duration::ZERO))
            .with_poll_interval(Duration::ZERO)
    }

    fn ctx() -> ApplyContext {
        ApplyContext::detached()
    }

    fn put(path: &std::path::Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_entry_resolves_path() {
        let (_temp, settings) = setup();
        let m = model(&settings, URL, "models/checkpoints");
        assert_eq!(
            m.path,
            settings.app_root.join("models/checkpoints/a.safetensors")
        );
        assert_eq!(Model::from_record(&m.to_record(), &settings), m);
    }

    #[test]
    fn test_entry_requires_url_with_host() {
        let (_temp, settings) = setup();
        let value: toml::Value =
            toml::from_str("url = \"not-a-url\"\nfilename = \"a\"\ndir = \"models\"").unwrap();
        assert!(matches!(
            Model::from_entry(&value, &settings),
            Err(EntryError::InvalidModelUrl(_))
        ));

        let value: toml::Value = toml::from_str("url = \"https://x.com/a\"\ndir = \"m\"").unwrap();
        assert!(matches!(
            Model::from_entry(&value, &settings),
            Err(EntryError::Malformed(_))
        ));
    }

    #[test]
    fn test_inspect_purges_interrupted_transfer() {
        let (_temp, settings) = setup();
        let m = model(&settings, URL, "models");
        put(&m.path, "partial");
        fs::write(control_file_for(&m.path), "").unwrap();

        assert!(m.inspect(&(), &ctx()).unwrap().is_absent());
        assert!(!m.path.exists());
        assert!(!control_file_for(&m.path).exists());
    }

    #[test]
    fn test_inspect_removes_cache_dir() {
        let (_temp, settings) = setup();
        let m = model(&settings, URL, "models");
        let cache = settings.app_root.join("models").join(".cache");
        fs::create_dir_all(cache.join("huggingface")).unwrap();
        fs::write(&m.path, "done").unwrap();

        assert!(m.inspect(&(), &ctx()).unwrap().is_present());
        assert!(!cache.exists());
    }

    #[test]
    fn test_download() {
        let (_temp, settings) = setup();
        let backend = MockBackend::new();
        let m = model(&settings, URL, "models/loras");

        let result = m.download(&downloader(&backend), &settings, &ctx()).unwrap();
        assert_eq!(result, ApplyResult::Success);
        assert_eq!(fs::read_to_string(&m.path).unwrap(), URL);

        let again = m.download(&downloader(&backend), &settings, &ctx()).unwrap();
        assert_eq!(again, ApplyResult::NoOp);
        assert_eq!(backend.requests().len(), 1);
    }

    #[test]
    fn test_download_sends_credentials() {
        let (_temp, mut settings) = setup();
        settings.credentials = Credentials {
            hf_token: Some("hf_abc".to_string()),
            civitai_token: None,
        };
        let backend = MockBackend::new();
        let m = model(&settings, URL, "models");
        m.download(&downloader(&backend), &settings, &ctx()).unwrap();

        let request = &backend.requests()[0];
        assert_eq!(request.url, URL);
        assert_eq!(
            request.header.as_deref(),
            Some("Authorization: Bearer hf_abc")
        );
    }

    #[test]
    fn test_download_auth_rejection_fails_fast() {
        let (_temp, settings) = setup();
        let backend = MockBackend::new();
        backend.push_outcome(
            URL,
            MockOutcome::Fail {
                code: "24".to_string(),
                message: "Authorization failed".to_string(),
            },
        );
        let m = model(&settings, URL, "models");

        let result = m.download(&downloader(&backend), &settings, &ctx()).unwrap();
        let ApplyResult::Failed { reason } = result else {
            panic!("download should fail: {result:?}");
        };
        assert!(reason.starts_with("authorization failed: Authorization failed"));
        assert!(reason.ends_with("Check the API token in your environment variables"));
        assert_eq!(backend.requests().len(), 1);
        assert!(!m.path.exists());
    }

    #[test]
    fn test_remove() {
        let (_temp, settings) = setup();
        let m = model(&settings, URL, "models");
        assert_eq!(m.remove(&ctx()).unwrap(), ApplyResult::NoOp);

        put(&m.path, "data");
        assert_eq!(m.remove(&ctx()).unwrap(), ApplyResult::Success);
        assert!(!m.path.exists());
    }

    #[test]
    fn test_move_relocates_bytes() {
        let (_temp, settings) = setup();
        let from = model(&settings, URL, "models");
        let to = model(&settings, URL, "models/checkpoints/sd15");
        put(&from.path, "weights");

        assert_eq!(to.move_from(&from, &ctx()).unwrap(), ApplyResult::Success);
        assert!(!from.path.exists());
        assert_eq!(fs::read_to_string(&to.path).unwrap(), "weights");
    }

    #[test]
    fn test_move_noop_cases() {
        let (_temp, settings) = setup();
        let from = model(&settings, URL, "models");
        let to = model(&settings, URL, "models/other");

        // source missing
        assert_eq!(to.move_from(&from, &ctx()).unwrap(), ApplyResult::NoOp);

        // same path
        put(&from.path, "weights");
        assert_eq!(from.move_from(&from, &ctx()).unwrap(), ApplyResult::NoOp);

        // destination exists
        put(&to.path, "other");
        assert_eq!(to.move_from(&from, &ctx()).unwrap(), ApplyResult::NoOp);
        assert_eq!(fs::read_to_string(&from.path).unwrap(), "weights");
    }
}
