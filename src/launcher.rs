//! Host application supervision
//!
//! The host is started as a child process with inherited stdio and awaited.
//! While it runs, SIGTERM and SIGINT received by this process are forwarded
//! to it as SIGTERM so the container can stop gracefully. The handlers are
//! installed before reconciliation starts; a signal arriving while no host
//! runs is remembered and otherwise ignored.

use crate::settings::Settings;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicI32, Ordering};

/// PID of the running host, 0 when none
static CHILD_PID: AtomicI32 = AtomicI32::new(0);

/// Last signal received while no host was running, 0 when none
static IGNORED_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Command line of the host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launcher {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    cwd: Option<PathBuf>,
}

impl Launcher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            envs: Vec::new(),
            cwd: None,
        }
    }

    /// `python <app_root>/main.py --listen <listen> --port <port> <extra args...>`
    pub fn from_settings(settings: &Settings) -> Self {
        let mut args = vec![
            settings.app_root.join("main.py").display().to_string(),
            "--listen".to_string(),
            settings.listen.clone(),
            "--port".to_string(),
            settings.port.to_string(),
        ];
        args.extend(settings.extra_args.iter().cloned());

        Self {
            envs: settings.child_envs(),
            cwd: Some(settings.app_root.clone()),
            ..Self::new(settings.python.clone(), args)
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run the host to completion and return the exit code to propagate
    pub fn run(&self) -> Result<i32> {
        log::info!("Launching: {} {}", self.program, self.args.join(" "));

        let mut command = Command::new(&self.program);
        command.args(&self.args).envs(self.envs.iter().cloned());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to launch {}", self.program))?;

        let pid = i32::try_from(child.id()).unwrap_or(0);
        CHILD_PID.store(pid, Ordering::SeqCst);

        let status = child.wait();
        CHILD_PID.store(0, Ordering::SeqCst);
        let status = status.context("Failed to wait for the host process")?;

        let code = exit_code(status);
        log::info!("Host exited with code: {code}");
        Ok(code)
    }
}

/// Exit code of a finished process, `128 + signal` when it was killed
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Take the signal received while no host was running, if any
pub fn take_ignored_signal() -> Option<i32> {
    match IGNORED_SIGNAL.swap(0, Ordering::SeqCst) {
        0 => None,
        signal => Some(signal),
    }
}

/// Send SIGTERM to the child in `child`, or record `signal` in `ignored`
///
/// Runs inside a signal handler: atomics and `kill` only.
#[cfg(unix)]
fn handle_signal(signal: libc::c_int, child: &AtomicI32, ignored: &AtomicI32) {
    let pid = child.load(Ordering::SeqCst);
    if pid > 0 {
        // SAFETY: kill is async-signal-safe
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
    } else {
        ignored.store(signal, Ordering::SeqCst);
    }
}

#[cfg(unix)]
extern "C" fn forward_signal(signal: libc::c_int) {
    handle_signal(signal, &CHILD_PID, &IGNORED_SIGNAL);
}

/// Route SIGTERM and SIGINT through the forwarding handler
#[cfg(unix)]
pub fn install_signal_handlers() {
    let handler = forward_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only touches atomics and calls kill
    unsafe {
        libc::signal(libc::SIGTERM, handler);
        libc::signal(libc::SIGINT, handler);
    }
}

#[cfg(not(unix))]
pub fn install_signal_handlers() {}
