//! Process execution with live log streaming.
//!
//! External tools are run as exclusive subprocesses. Every line they print is
//! forwarded to the log as it arrives, prefixed with the caller's
//! [`ApplyContext`], and also captured so callers can scrape it afterwards.

use crate::error::{Error, Result};
use crate::types::CommandOutput;
use declarative::ApplyContext;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

/// Options applied to every spawned process.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Extra environment variables for the child
    pub envs: Vec<(String, String)>,
    /// Working directory for the child
    pub cwd: Option<PathBuf>,
}

impl ExecOptions {
    /// Options carrying the given extra environment.
    pub fn with_envs(envs: Vec<(String, String)>) -> Self {
        Self { envs, cwd: None }
    }
}

/// Run a program to completion, streaming its output into the log.
///
/// stdout lines are logged at info level, stderr lines at warn level. The
/// exit status is returned, not checked; see [`run_checked`].
pub fn run_streaming<I, S>(
    program: impl AsRef<OsStr>,
    args: I,
    opts: &ExecOptions,
    ctx: &ApplyContext,
) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    let display = program.to_string_lossy().into_owned();

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .envs(opts.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    if let Some(dir) = &opts.cwd {
        cmd.current_dir(dir);
    }

    log::debug!("{ctx}executing: {cmd:?}");

    let mut child = cmd.spawn().map_err(|source| Error::Spawn {
        program: display.clone(),
        source,
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Other(format!("stdout of {display} not captured")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Other(format!("stderr of {display} not captured")))?;

    let ctx = *ctx;
    let (stdout, stderr) = thread::scope(|scope| {
        let err_handle = scope.spawn(move || pump(stderr, ctx, log::Level::Warn));
        let out = pump(stdout, ctx, log::Level::Info);
        let err = err_handle.join().unwrap_or_default();
        (out, err)
    });

    let status = child.wait()?;

    Ok(CommandOutput {
        code: status.code(),
        stdout,
        stderr,
    })
}

/// Like [`run_streaming`], but a non-zero exit becomes [`Error::CommandFailed`].
pub fn run_checked<I, S>(
    program: impl AsRef<OsStr>,
    args: I,
    opts: &ExecOptions,
    ctx: &ApplyContext,
) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.as_ref().to_string_lossy().into_owned();
    let output = run_streaming(program, args, opts, ctx)?;
    if !output.success() {
        return Err(Error::CommandFailed {
            program: name,
            status: output.status_string(),
        });
    }
    Ok(output)
}

/// Forward lines from `reader` to the log and return everything read.
fn pump(reader: impl Read, ctx: ApplyContext, level: log::Level) -> String {
    let mut reader = BufReader::new(reader);
    let mut captured = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    log::log!(level, "{ctx}{trimmed}");
                }
                captured.push_str(&line);
            }
        }
    }

    captured
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_streaming_captures_stdout() {
        let output = run_streaming(
            "sh",
            ["-c", "echo first; echo second"],
            &ExecOptions::default(),
            &ApplyContext::detached(),
        )
        .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "first\nsecond\n");
    }

    #[test]
    fn test_run_streaming_captures_stderr_separately() {
        let output = run_streaming(
            "sh",
            ["-c", "echo oops 1>&2; exit 3"],
            &ExecOptions::default(),
            &ApplyContext::detached(),
        )
        .unwrap();

        assert_eq!(output.code, Some(3));
        assert_eq!(output.stderr.trim(), "oops");
        assert!(output.stdout.is_empty());
    }

    #[test]
    fn test_run_streaming_passes_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ExecOptions {
            envs: vec![("BOOT_TEST_VALUE".to_string(), "42".to_string())],
            cwd: Some(dir.path().to_path_buf()),
        };

        let output = run_streaming(
            "sh",
            ["-c", "echo $BOOT_TEST_VALUE; pwd"],
            &opts,
            &ApplyContext::detached(),
        )
        .unwrap();

        let lines: Vec<&str> = output.stdout.lines().collect();
        assert_eq!(lines[0], "42");
        assert_eq!(
            std::fs::canonicalize(lines[1]).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }

    #[test]
    fn test_run_checked_rejects_nonzero_exit() {
        let err = run_checked(
            "sh",
            ["-c", "exit 1"],
            &ExecOptions::default(),
            &ApplyContext::detached(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { .. }));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = run_streaming(
            "definitely-not-a-real-program-xyz",
            std::iter::empty::<&str>(),
            &ExecOptions::default(),
            &ApplyContext::detached(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
