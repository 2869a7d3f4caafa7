//! Git backend using the `git` command-line tool.

use crate::backend::Vcs;
use crate::error::Result;
use crate::exec::{ExecOptions, run_checked};
use declarative::ApplyContext;
use std::path::Path;
use std::process::{Command, Stdio};

/// Backend that executes real `git` commands.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    opts: ExecOptions,
}

impl GitCli {
    /// Create a new git backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Vcs for GitCli {
    fn clone_repo(
        &self,
        url: &str,
        reference: Option<&str>,
        dest: &Path,
        ctx: &ApplyContext,
    ) -> Result<()> {
        let mut args: Vec<&str> = vec!["clone"];
        if let Some(reference) = reference {
            args.extend(["-b", reference]);
        }
        let dest = dest.to_string_lossy();
        args.extend([url, &*dest]);

        run_checked("git", &args, &self.opts, ctx)?;
        Ok(())
    }

    fn is_checkout(&self, path: &Path) -> bool {
        let Ok(output) = Command::new("git")
            .arg("-C")
            .arg(path)
            .args(["rev-parse", "--show-toplevel"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
        else {
            return false;
        };

        if !output.status.success() {
            return false;
        }

        let toplevel = String::from_utf8_lossy(&output.stdout);
        match (
            Path::new(toplevel.trim()).canonicalize(),
            path.canonicalize(),
        ) {
            (Ok(top), Ok(this)) => top == this,
            _ => false,
        }
    }
}
