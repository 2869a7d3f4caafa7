//! User hook scripts
//!
//! `.py` scripts run with the configured Python, `.sh` scripts with bash.
//! Output is streamed into the log like every other child process.

use anyhow::{Result, bail};
use declarative::{ApplyContext, ApplyResult, PhaseProgress};
use nodekit::{ExecOptions, run_streaming};
use std::fs;
use std::path::{Path, PathBuf};

/// Runs hook scripts with the boot's child environment
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    python: String,
    opts: ExecOptions,
}

impl ScriptRunner {
    pub fn new(python: impl Into<String>, opts: ExecOptions) -> Self {
        Self {
            python: python.into(),
            opts,
        }
    }

    fn interpreter(&self, script: &Path) -> Option<&str> {
        match script.extension().and_then(|e| e.to_str()) {
            Some("py") => Some(self.python.as_str()),
            Some("sh") => Some("bash"),
            _ => None,
        }
    }

    /// Run one script; a missing file, unsupported type or non-zero exit fails
    pub fn run(&self, script: &Path, ctx: &ApplyContext) -> Result<()> {
        if !script.is_file() {
            bail!("Invalid script path: {}", script.display());
        }
        let Some(interpreter) = self.interpreter(script) else {
            bail!("Unsupported script type: {}", script.display());
        };

        let output = run_streaming(interpreter, [script], &self.opts, ctx)?;
        if !output.success() {
            bail!(
                "{} exited with non-zero code: {}",
                script.display(),
                output.status_string()
            );
        }
        log::info!("{ctx}Successfully executed script: {}", script.display());
        Ok(())
    }

    /// Run every `*.py` and `*.sh` directly inside `dir`, sorted by name.
    ///
    /// Failures are logged and do not stop the remaining scripts. A regular
    /// file at `dir` is removed.
    pub fn run_dir(&self, dir: &Path) -> Vec<(PathBuf, ApplyResult)> {
        if dir.is_file() {
            log::warn!("Invalid scripts directory detected, removing {}", dir.display());
            if let Err(e) = fs::remove_file(dir) {
                log::error!("Failed to remove {}: {e}", dir.display());
            }
            return Vec::new();
        }

        let queue = match collect_scripts(dir) {
            Ok(queue) => queue,
            Err(e) => {
                log::info!("No scripts run from {}: {e}", dir.display());
                return Vec::new();
            }
        };
        if queue.is_empty() {
            log::info!("No supported scripts found in {}", dir.display());
            return Vec::new();
        }

        log::info!("Found {} scripts in {}:", queue.len(), dir.display());
        for script in &queue {
            log::info!("└─ {}", file_name(script));
        }

        let mut progress = PhaseProgress::new(queue.len());
        let mut results = Vec::with_capacity(queue.len());
        for script in queue {
            let ctx = progress.advance();
            log::info!("{ctx}Executing script: {}", file_name(&script));
            let result = match self.run(&script, &ctx) {
                Ok(()) => ApplyResult::Success,
                Err(e) => {
                    log::warn!("{ctx}{e:#}");
                    ApplyResult::failed(e)
                }
            };
            results.push((script, result));
        }
        results
    }
}

fn collect_scripts(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut scripts: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext == "py" || ext == "sh")
        })
        .collect();
    scripts.sort();
    Ok(scripts)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runner() -> ScriptRunner {
        ScriptRunner::new("python3", ExecOptions::default())
    }

    #[test]
    fn test_missing_script_fails() {
        let temp = TempDir::new().unwrap();
        let err = runner()
            .run(&temp.path().join("nope.sh"), &ApplyContext::detached())
            .unwrap_err();
        assert!(err.to_string().contains("Invalid script path"));
    }

    #[test]
    fn test_unsupported_type_fails() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("hook.rb");
        fs::write(&script, "puts 1").unwrap();
        let err = runner().run(&script, &ApplyContext::detached()).unwrap_err();
        assert!(err.to_string().contains("Unsupported script type"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_dir_runs_sorted_and_continues_after_failure() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("order.log");
        let dir = temp.path().join("pre-init");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("20-second.sh"),
            format!("echo second >> {}\n", log.display()),
        )
        .unwrap();
        fs::write(
            dir.join("10-first.sh"),
            format!("echo first >> {}\nexit 3\n", log.display()),
        )
        .unwrap();
        fs::write(dir.join("readme.txt"), "ignored").unwrap();

        let results = runner().run_dir(&dir);
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_failure());
        assert!(results[1].1.is_success());
        assert_eq!(fs::read_to_string(&log).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_run_dir_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(runner().run_dir(&temp.path().join("post-init")).is_empty());
    }

    #[test]
    fn test_run_dir_file_is_removed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("post-init");
        fs::write(&path, "oops").unwrap();
        assert!(runner().run_dir(&path).is_empty());
        assert!(!path.exists());
    }
}
