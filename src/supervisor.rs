//! Lifecycle control for the managed notebook server
//!
//! A single server instance is tracked through a PID file. The file is a
//! hint, not the truth: liveness is always re-checked against the OS, and
//! a PID file pointing at a dead process is treated as "not running" and
//! cleaned up on sight. There is an unavoidable window between the
//! liveness check and acting on the PID; with one interactive operator
//! that is tolerated rather than locked around.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use regex::Regex;
use thiserror::Error;

use crate::config::Config;
use crate::paths::StatePaths;
use crate::runner::{CommandRunner, CommandSpec};

/// Pause between launching the server and checking it survived startup.
pub const SETTLE_INTERVAL: Duration = Duration::from_secs(2);

const PUBLIC_IP_ENDPOINT: &str = "https://api.ipify.org";

#[derive(Debug, Error)]
pub enum StartError {
    #[error("server is already running")]
    AlreadyRunning,
    #[error("server is not installed; run the installer first")]
    NotInstalled,
    #[error("failed to launch server")]
    Spawn(#[source] anyhow::Error),
    #[error("server exited during startup; see {}", .0.display())]
    LaunchFailed(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum StopError {
    #[error("server is not running")]
    NotRunning,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result of a successful start.
#[derive(Debug)]
pub struct StartOutcome {
    pub pid: u32,
    /// Tokenised access URL scraped from the server log, when present.
    pub access_url: Option<String>,
}

/// Snapshot for the menu banner.
#[derive(Debug, Clone, Copy)]
pub struct Status {
    pub installed: bool,
    pub running: Option<u32>,
    pub port: u16,
    pub tls: bool,
}

pub struct Supervisor<'a> {
    paths: &'a StatePaths,
    runner: &'a dyn CommandRunner,
    settle: Duration,
}

impl<'a> Supervisor<'a> {
    pub fn new(paths: &'a StatePaths, runner: &'a dyn CommandRunner) -> Self {
        Self {
            paths,
            runner,
            settle: SETTLE_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn is_installed(&self, cfg: &Config) -> bool {
        cfg.install_dir.is_dir()
    }

    /// True when the PID file names a live process. A missing, unparsable,
    /// or stale PID file means "not running"; stale files are removed.
    pub fn is_running(&self) -> bool {
        let Some(pid) = self.read_pid() else {
            return false;
        };
        if self.runner.is_alive(pid) {
            return true;
        }
        debug!("removing stale PID file for dead pid {pid}");
        let _ = fs::remove_file(&self.paths.pid_file);
        false
    }

    pub fn status(&self, cfg: &Config) -> Status {
        Status {
            installed: self.is_installed(cfg),
            running: if self.is_running() { self.read_pid() } else { None },
            port: cfg.port,
            tls: cfg.use_tls,
        }
    }

    pub fn start(&self, cfg: &Config) -> Result<StartOutcome, StartError> {
        if self.is_running() {
            return Err(StartError::AlreadyRunning);
        }
        if !self.is_installed(cfg) {
            return Err(StartError::NotInstalled);
        }

        let spec = server_command(cfg, self.paths);
        info!("launching: {spec}");
        let pid = self
            .runner
            .spawn_detached(&spec, &self.paths.log_file)
            .map_err(StartError::Spawn)?;
        fs::write(&self.paths.pid_file, format!("{pid}\n"))?;

        thread::sleep(self.settle);
        if !self.runner.is_alive(pid) {
            let _ = fs::remove_file(&self.paths.pid_file);
            return Err(StartError::LaunchFailed(self.paths.log_file.clone()));
        }

        info!("server running (pid {pid})");
        Ok(StartOutcome {
            pid,
            access_url: scan_access_url(&self.paths.log_file),
        })
    }

    pub fn stop(&self) -> Result<(), StopError> {
        if !self.is_running() {
            return Err(StopError::NotRunning);
        }
        let Some(pid) = self.read_pid() else {
            return Err(StopError::NotRunning);
        };

        if let Err(e) = self.runner.terminate(pid) {
            // Reported but never blocks PID file cleanup.
            warn!("failed to signal pid {pid}: {e:#}");
        }
        fs::remove_file(&self.paths.pid_file)?;
        info!("server stopped (pid {pid})");
        Ok(())
    }

    fn read_pid(&self) -> Option<u32> {
        let text = fs::read_to_string(&self.paths.pid_file).ok()?;
        text.trim().parse::<u32>().ok()
    }
}

fn server_command(cfg: &Config, paths: &StatePaths) -> CommandSpec {
    let jupyter = cfg.install_dir.join("bin").join("jupyter");
    let app = if cfg.use_extension { "lab" } else { "notebook" };
    let mut spec = CommandSpec::new(jupyter.display().to_string())
        .arg(app)
        .arg("--no-browser")
        .arg("--ip=0.0.0.0")
        .arg(format!("--port={}", cfg.port));
    if cfg.use_tls && paths.tls_material_present() {
        spec = spec
            .arg(format!("--certfile={}", paths.cert_file.display()))
            .arg(format!("--keyfile={}", paths.key_file.display()));
    }
    spec
}

/// Last tokenised URL the server printed, if any.
fn scan_access_url(log: &Path) -> Option<String> {
    let text = fs::read_to_string(log).ok()?;
    let re = Regex::new(r#"https?://[^\s"']+\?token=[A-Za-z0-9]+"#).ok()?;
    re.find_iter(&text).last().map(|m| m.as_str().to_string())
}

/// Best-effort public address lookup. Degrades to None on any failure.
pub fn public_ip() -> Option<String> {
    let agent = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(3)))
        .build()
        .new_agent();
    let mut response = agent.get(PUBLIC_IP_ENDPOINT).call().ok()?;
    let body = response.body_mut().read_to_string().ok()?;
    let ip = body.trim();
    if ip.is_empty() {
        None
    } else {
        Some(ip.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::FakeRunner;

    struct Fixture {
        _dir: tempfile::TempDir,
        paths: StatePaths,
        runner: FakeRunner,
        cfg: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let paths = StatePaths::under(dir.path());
            let cfg = Config {
                install_dir: dir.path().join("venv"),
                ..Config::default()
            };
            fs::create_dir_all(&cfg.install_dir).unwrap();
            Self {
                _dir: dir,
                paths,
                runner: FakeRunner::new(),
                cfg,
            }
        }

        fn supervisor(&self) -> Supervisor<'_> {
            Supervisor::new(&self.paths, &self.runner).with_settle(Duration::ZERO)
        }
    }

    #[test]
    fn not_running_without_pid_file() {
        let fx = Fixture::new();
        assert!(!fx.supervisor().is_running());
    }

    #[test]
    fn stale_pid_file_is_removed_and_reported_not_running() {
        let fx = Fixture::new();
        fs::write(&fx.paths.pid_file, "31337\n").unwrap();
        assert!(!fx.supervisor().is_running());
        assert!(!fx.paths.pid_file.exists());
    }

    #[test]
    fn garbage_pid_file_means_not_running() {
        let fx = Fixture::new();
        fs::write(&fx.paths.pid_file, "not-a-pid\n").unwrap();
        assert!(!fx.supervisor().is_running());
    }

    #[test]
    fn start_records_pid_and_reports_running() {
        let fx = Fixture::new();
        let sup = fx.supervisor();
        let outcome = sup.start(&fx.cfg).unwrap();
        assert!(sup.is_running());
        let on_disk: u32 = fs::read_to_string(&fx.paths.pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(on_disk, outcome.pid);
    }

    #[test]
    fn start_when_running_leaves_pid_file_untouched() {
        let fx = Fixture::new();
        let sup = fx.supervisor();
        sup.start(&fx.cfg).unwrap();
        let before = fs::read_to_string(&fx.paths.pid_file).unwrap();
        let err = sup.start(&fx.cfg).unwrap_err();
        assert!(matches!(err, StartError::AlreadyRunning));
        assert_eq!(fs::read_to_string(&fx.paths.pid_file).unwrap(), before);
        assert_eq!(fx.runner.spawns.borrow().len(), 1);
    }

    #[test]
    fn start_requires_installation() {
        let fx = Fixture::new();
        fs::remove_dir_all(&fx.cfg.install_dir).unwrap();
        let err = fx.supervisor().start(&fx.cfg).unwrap_err();
        assert!(matches!(err, StartError::NotInstalled));
    }

    #[test]
    fn failed_launch_clears_pid_file() {
        let fx = Fixture::new();
        *fx.runner.spawn_dies.borrow_mut() = true;
        let err = fx.supervisor().start(&fx.cfg).unwrap_err();
        assert!(matches!(err, StartError::LaunchFailed(_)));
        assert!(!fx.paths.pid_file.exists());
    }

    #[test]
    fn stop_terminates_and_removes_pid_file() {
        let fx = Fixture::new();
        let sup = fx.supervisor();
        let outcome = sup.start(&fx.cfg).unwrap();
        sup.stop().unwrap();
        assert!(!sup.is_running());
        assert!(!fx.paths.pid_file.exists());
        assert_eq!(*fx.runner.terminated.borrow(), vec![outcome.pid]);
    }

    #[test]
    fn failed_signal_still_removes_pid_file() {
        let fx = Fixture::new();
        let sup = fx.supervisor();
        let outcome = sup.start(&fx.cfg).unwrap();

        *fx.runner.terminate_fails.borrow_mut() = true;
        sup.stop().unwrap();

        assert!(!fx.paths.pid_file.exists());
        assert_eq!(*fx.runner.terminated.borrow(), vec![outcome.pid]);
    }

    #[test]
    fn stop_when_not_running_is_an_error() {
        let fx = Fixture::new();
        let err = fx.supervisor().stop().unwrap_err();
        assert!(matches!(err, StopError::NotRunning));
    }

    #[test]
    fn server_command_uses_lab_when_extension_enabled() {
        let fx = Fixture::new();
        let mut cfg = fx.cfg.clone();
        cfg.use_extension = true;
        cfg.port = 9000;
        let spec = server_command(&cfg, &fx.paths);
        assert!(spec.program.ends_with("bin/jupyter"));
        assert_eq!(spec.args[0], "lab");
        assert!(spec.args.contains(&"--port=9000".to_string()));
    }

    #[test]
    fn server_command_adds_tls_flags_only_with_material() {
        let fx = Fixture::new();
        let mut cfg = fx.cfg.clone();
        cfg.use_tls = true;

        let spec = server_command(&cfg, &fx.paths);
        assert!(!spec.args.iter().any(|a| a.starts_with("--certfile=")));

        fs::write(&fx.paths.cert_file, "cert").unwrap();
        fs::write(&fx.paths.key_file, "key").unwrap();
        let spec = server_command(&cfg, &fx.paths);
        assert!(spec.args.iter().any(|a| a.starts_with("--certfile=")));
        assert!(spec.args.iter().any(|a| a.starts_with("--keyfile=")));
    }

    #[test]
    fn access_url_scan_picks_last_token_url() {
        let fx = Fixture::new();
        fs::write(
            &fx.paths.log_file,
            "[I ServerApp] http://localhost:8888/?token=aaa111\n\
             [I ServerApp] http://127.0.0.1:8888/?token=bbb222\n",
        )
        .unwrap();
        assert_eq!(
            scan_access_url(&fx.paths.log_file).as_deref(),
            Some("http://127.0.0.1:8888/?token=bbb222")
        );
    }
}
