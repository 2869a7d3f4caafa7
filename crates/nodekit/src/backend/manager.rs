//! Extension-manager backend driving `cm-cli.py`.

use crate::backend::Manager;
use crate::error::{Error, Result};
use crate::exec::{ExecOptions, run_checked, run_streaming};
use crate::parse::{find_error, parse_install_output};
use crate::types::InstallOutcome;
use declarative::ApplyContext;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// File name of the manager's command-line entry point.
pub const CLI_SCRIPT: &str = "cm-cli.py";

/// Backend that executes the manager CLI through the Python interpreter.
#[derive(Debug, Clone)]
pub struct CliManager {
    python: OsString,
    script: PathBuf,
    opts: ExecOptions,
}

impl CliManager {
    /// Create a backend for the manager checked out at `manager_dir`.
    pub fn new(python: impl Into<OsString>, manager_dir: &Path) -> Self {
        Self {
            python: python.into(),
            script: manager_dir.join(CLI_SCRIPT),
            opts: ExecOptions::default(),
        }
    }

    /// Pass extra environment variables to every invocation.
    #[must_use]
    pub fn with_envs(mut self, envs: Vec<(String, String)>) -> Self {
        self.opts.envs = envs;
        self
    }

    /// Path to the CLI script.
    pub fn script(&self) -> &Path {
        &self.script
    }

    fn args(&self, command: &str, rest: &[&str]) -> Vec<OsString> {
        let mut args = vec![self.script.clone().into_os_string(), command.into()];
        args.extend(rest.iter().map(OsString::from));
        args
    }

    fn run(&self, command: &str, rest: &[&str], ctx: &ApplyContext) -> Result<()> {
        run_checked(&self.python, self.args(command, rest), &self.opts, ctx)
            .map(|_| ())
            .map_err(|e| match e {
                Error::CommandFailed { status, .. } => Error::CommandFailed {
                    program: format!("{CLI_SCRIPT} {command}"),
                    status,
                },
                other => other,
            })
    }
}

impl Manager for CliManager {
    fn install(&self, id: &str, version: &str, ctx: &ApplyContext) -> Result<InstallOutcome> {
        let spec = format!("{id}@{version}");
        let output = run_streaming(
            &self.python,
            self.args("install", &[spec.as_str()]),
            &self.opts,
            ctx,
        )?;

        if let Some(message) = find_error(&output.stdout) {
            return Err(Error::Reported { message });
        }
        if !output.success() {
            return Err(Error::CommandFailed {
                program: format!("{CLI_SCRIPT} install"),
                status: output.status_string(),
            });
        }

        parse_install_output(&output.stdout)
    }

    fn uninstall(&self, id: &str, ctx: &ApplyContext) -> Result<()> {
        self.run("uninstall", &[id], ctx)
    }

    fn update(&self, path: &Path, ctx: &ApplyContext) -> Result<()> {
        let arg = path.to_string_lossy();
        self.run("update", &[&*arg], ctx)
    }

    fn post_install(&self, path: &Path, ctx: &ApplyContext) -> Result<()> {
        let arg = path.to_string_lossy();
        self.run("post-install", &[&*arg], ctx)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    /// Write a shell stand-in for the CLI script; `sh` plays the interpreter.
    fn fake_manager(dir: &Path, body: &str) -> CliManager {
        fs::write(dir.join(CLI_SCRIPT), format!("{body}\n")).unwrap();
        CliManager::new("sh", dir)
    }

    #[test]
    fn test_script_path() {
        let manager = CliManager::new("python3", Path::new("/opt/manager"));
        assert_eq!(manager.script(), Path::new("/opt/manager/cm-cli.py"));
    }

    #[test]
    fn test_install_parses_result() {
        let dir = tempfile::tempdir().unwrap();
        let manager = fake_manager(dir.path(), r#"echo "1/1 [INSTALLED] $2""#);

        let outcome = manager
            .install("foo", "nightly", &ApplyContext::detached())
            .unwrap();
        assert_eq!(outcome, InstallOutcome::Installed);
    }

    #[test]
    fn test_install_error_marker_beats_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let manager = fake_manager(dir.path(), "echo 'ERROR: no such node'; exit 1");

        let err = manager
            .install("foo", "nightly", &ApplyContext::detached())
            .unwrap_err();
        assert_eq!(err.to_string(), "no such node");
    }

    #[test]
    fn test_install_nonzero_exit_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        let manager = fake_manager(dir.path(), "exit 2");

        let err = manager
            .install("foo", "nightly", &ApplyContext::detached())
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
    }

    #[test]
    fn test_update_passes_target_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("args.txt");
        let manager = fake_manager(
            dir.path(),
            &format!(r#"echo "$@ $EXTRA" > {}"#, log.display()),
        )
        .with_envs(vec![("EXTRA".to_string(), "yes".to_string())]);

        manager
            .update(Path::new("/nodes/foo"), &ApplyContext::detached())
            .unwrap();

        assert_eq!(fs::read_to_string(log).unwrap().trim(), "update /nodes/foo yes");
    }
}
