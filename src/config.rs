//! Boot config discovery and merge
//!
//! Fragments are `*.toml` files anywhere under the config directory. Files
//! with a numeric prefix (`10-base.toml`) load first in numeric order, the
//! rest follow by name. Top-level `custom_nodes` and `models` arrays are
//! concatenated across fragments.

use anyhow::{Context, Result, bail};
use regex::Regex;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static NUMERIC_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-").expect("valid prefix regex"));

/// The merged desired state, still as raw TOML entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BootConfig {
    pub custom_nodes: Vec<toml::Value>,
    pub models: Vec<toml::Value>,
}

impl BootConfig {
    pub fn is_empty(&self) -> bool {
        self.custom_nodes.is_empty() && self.models.is_empty()
    }

    fn merge(&mut self, path: &Path, table: toml::Table) {
        for (key, value) in table {
            let target = match key.as_str() {
                "custom_nodes" => &mut self.custom_nodes,
                "models" => &mut self.models,
                _ => {
                    log::debug!("Ignoring unknown key '{key}' in {}", path.display());
                    continue;
                }
            };
            match value {
                toml::Value::Array(items) => target.extend(items),
                other => log::warn!(
                    "Expected an array for '{key}' in {}, found {}",
                    path.display(),
                    other.type_str()
                ),
            }
        }
    }
}

/// Finds, filters, orders and merges config fragments
#[derive(Debug)]
pub struct ConfigLoader {
    dir: PathBuf,
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl ConfigLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            include: None,
            exclude: None,
        }
    }

    /// Only keep files whose path matches `pattern`
    pub fn include(mut self, pattern: Option<&str>) -> Self {
        self.include = pattern.and_then(|p| compile_filter("Include", p));
        self
    }

    /// Drop files whose path matches `pattern`
    pub fn exclude(mut self, pattern: Option<&str>) -> Self {
        self.exclude = pattern.and_then(|p| compile_filter("Exclude", p));
        self
    }

    /// Load and merge every fragment.
    ///
    /// A missing directory means no config. A regular file in its place is
    /// removed. Fragments that fail to parse are skipped.
    pub fn load(&self) -> Result<BootConfig> {
        if self.dir.is_file() {
            log::warn!("Invalid config detected, removing {}", self.dir.display());
            fs::remove_file(&self.dir)
                .with_context(|| format!("Failed to remove {}", self.dir.display()))?;
            return Ok(BootConfig::default());
        }
        if !self.dir.exists() {
            log::info!("No config directory found at {}", self.dir.display());
            return Ok(BootConfig::default());
        }

        log::info!("Loading config: {}", self.dir.display());
        let files = self.discover()?;

        log::info!("Found {} config files:", files.len());
        for file in &files {
            log::info!("└─ {}", file.display());
        }

        let mut config = BootConfig::default();
        for file in &files {
            match parse_fragment(file) {
                Ok(table) => config.merge(file, table),
                Err(e) => log::error!("Failed to parse config file '{}': {e:#}", file.display()),
            }
        }

        if config.is_empty() {
            log::info!("No valid config found");
        }
        log::debug!("Loaded config: {config:?}");
        Ok(config)
    }

    fn discover(&self) -> Result<Vec<PathBuf>> {
        // The root itself must be readable; problems below it are skipped
        fs::read_dir(&self.dir)
            .with_context(|| format!("Could not read config directory {}", self.dir.display()))?;

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.dir).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if e.depth() == 0 {
                        bail!("Could not read config directory {}: {e}", self.dir.display());
                    }
                    log::warn!("Skipping unreadable config entry: {e}");
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                files.push(path.to_path_buf());
            }
        }

        if self.include.is_some() || self.exclude.is_some() {
            files.retain(|path| self.accepts(path));
        }
        files.sort_by(|a, b| compare_fragments(a, b));
        Ok(files)
    }

    fn accepts(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        if let Some(include) = &self.include
            && !include.is_match(&text)
        {
            return false;
        }
        if let Some(exclude) = &self.exclude
            && exclude.is_match(&text)
        {
            return false;
        }
        true
    }
}

fn compile_filter(kind: &str, pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => {
            log::info!("{kind} config filter: {pattern}");
            Some(re)
        }
        Err(e) => {
            log::error!("Invalid regex pattern: {pattern}\n{e}");
            None
        }
    }
}

fn parse_fragment(path: &Path) -> Result<toml::Table> {
    let content = fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&content)?;
    Ok(table)
}

fn numeric_prefix(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    NUMERIC_PREFIX.captures(name)?.get(1)?.as_str().parse().ok()
}

/// Numbered files first in numeric order, then everything by file name
fn compare_fragments(a: &Path, b: &Path) -> Ordering {
    let by_prefix = match (numeric_prefix(a), numeric_prefix(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_prefix.then_with(|| a.file_name().cmp(&b.file_name()))
}

/// Extract repo name from URL
pub fn repo_name_from_url(url: &str) -> Option<String> {
    let url = url.trim_end_matches('/').trim_end_matches(".git");
    url.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn node_ids(config: &BootConfig) -> Vec<String> {
        config
            .custom_nodes
            .iter()
            .map(|v| v.get("node_id").unwrap().as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_repo_name_from_url() {
        assert_eq!(
            repo_name_from_url("https://github.com/kijai/ComfyUI-KJNodes.git"),
            Some("ComfyUI-KJNodes".to_string())
        );
        assert_eq!(
            repo_name_from_url("https://github.com/org/repo/"),
            Some("repo".to_string())
        );
        assert_eq!(repo_name_from_url(""), None);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        let config = ConfigLoader::new(temp.path().join("none")).load().unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_file_in_place_of_dir_is_removed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("boot_config");
        fs::write(&path, "junk").unwrap();

        let config = ConfigLoader::new(&path).load().unwrap();
        assert!(config.is_empty());
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("boot_config");
        std::os::unix::fs::symlink("/dev/null", &path).unwrap();

        let err = ConfigLoader::new(&path).load().unwrap_err();
        assert!(err.to_string().starts_with("Could not read config directory"));
    }

    #[test]
    fn test_merge_order_numeric_then_name() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "b.toml", "[[custom_nodes]]\nnode_id = \"b\"\n");
        write(temp.path(), "10-x.toml", "[[custom_nodes]]\nnode_id = \"ten\"\n");
        write(temp.path(), "2-y.toml", "[[custom_nodes]]\nnode_id = \"two\"\n");
        write(temp.path(), "nested/a.toml", "[[custom_nodes]]\nnode_id = \"a\"\n");
        write(temp.path(), "notes.txt", "[[custom_nodes]]\nnode_id = \"txt\"\n");

        let config = ConfigLoader::new(temp.path()).load().unwrap();
        assert_eq!(node_ids(&config), vec!["two", "ten", "a", "b"]);
    }

    #[test]
    fn test_bad_fragment_is_skipped() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "1-bad.toml", "custom_nodes = [ oops");
        write(
            temp.path(),
            "2-good.toml",
            "[[models]]\nurl = \"https://example.com/a\"\nfilename = \"a\"\ndir = \"models\"\n",
        );

        let config = ConfigLoader::new(temp.path()).load().unwrap();
        assert!(config.custom_nodes.is_empty());
        assert_eq!(config.models.len(), 1);
    }

    #[test]
    fn test_non_array_value_is_ignored() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.toml", "custom_nodes = \"x\"\nextra = 1\n");
        let config = ConfigLoader::new(temp.path()).load().unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_include_and_exclude_filters() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "1-base.toml", "[[custom_nodes]]\nnode_id = \"base\"\n");
        write(temp.path(), "2-video.toml", "[[custom_nodes]]\nnode_id = \"video\"\n");
        write(temp.path(), "3-video-extra.toml", "[[custom_nodes]]\nnode_id = \"extra\"\n");

        let config = ConfigLoader::new(temp.path())
            .include(Some("video"))
            .exclude(Some("extra"))
            .load()
            .unwrap();
        assert_eq!(node_ids(&config), vec!["video"]);
    }

    #[test]
    fn test_invalid_filter_is_ignored() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.toml", "[[custom_nodes]]\nnode_id = \"a\"\n");
        let config = ConfigLoader::new(temp.path())
            .include(Some("("))
            .load()
            .unwrap();
        assert_eq!(node_ids(&config), vec!["a"]);
    }
}
