//! Narrow capability interface over OS processes
//!
//! Everything the installer, supervisor, and trainer wrapper need from the
//! operating system goes through [`CommandRunner`], so the logic on top can
//! be exercised against a fake in tests. [`SystemRunner`] is the real
//! implementation: std::process for execution, `which` for tool discovery,
//! and nix signals for liveness probing and termination.

use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// A program invocation: program name (or path) plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Process-level operations used by the rest of the crate.
pub trait CommandRunner {
    /// Run a command to completion with inherited stdio. Returns the exit
    /// code (-1 when the process was killed by a signal).
    fn run(&self, spec: &CommandSpec) -> Result<i32>;

    /// Launch a long-lived process detached from this one, with combined
    /// stdout/stderr appended to `log`. Returns its PID.
    fn spawn_detached(&self, spec: &CommandSpec, log: &Path) -> Result<u32>;

    /// Signal-0 style liveness probe.
    fn is_alive(&self, pid: u32) -> bool;

    /// Ask the process to terminate (SIGTERM).
    fn terminate(&self, pid: u32) -> Result<()>;

    /// Locate an executable on PATH.
    fn find_tool(&self, name: &str) -> Option<PathBuf>;
}

/// The real thing.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<i32> {
        let status = Command::new(&spec.program)
            .args(&spec.args)
            .status()
            .with_context(|| format!("Failed to execute {}", spec.program))?;
        Ok(status.code().unwrap_or(-1))
    }

    fn spawn_detached(&self, spec: &CommandSpec, log: &Path) -> Result<u32> {
        let out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log)
            .with_context(|| format!("Failed to open log file {}", log.display()))?;
        let err = out
            .try_clone()
            .context("Failed to duplicate log file handle")?;

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::from(err));

        // New process group so the server outlives this controller.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command
            .spawn()
            .with_context(|| format!("Failed to launch {}", spec.program))?;
        Ok(child.id())
    }

    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(pid as i32);

        // The server is spawned as our child, so reap it first: an exited
        // child left unreaped is a zombie, and a zombie still answers the
        // signal-0 probe.
        match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => return true,
            Ok(_) => return false,
            // Not our child (e.g. a fresh controller run); probe below.
            Err(_) => {}
        }

        match kill(pid, None) {
            Ok(()) => true,
            // Alive but owned by someone else.
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn terminate(&self, pid: u32) -> Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
            .with_context(|| format!("Failed to signal pid {pid}"))?;
        Ok(())
    }

    fn find_tool(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}


#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn dead_child_is_not_reported_alive() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("out.log");
        let runner = SystemRunner;
        let pid = runner
            .spawn_detached(&CommandSpec::new("true"), &log)
            .unwrap();

        // `true` exits immediately; once it has, the probe must see it as
        // dead rather than finding an unreaped zombie.
        let deadline = Instant::now() + Duration::from_secs(5);
        while runner.is_alive(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(
            !runner.is_alive(pid),
            "dead child pid {pid} still reported alive"
        );
    }
}
