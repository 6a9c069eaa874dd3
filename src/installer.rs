//! Idempotent environment installation and removal
//!
//! Install is a short-circuiting sequence of external commands: system
//! dependencies, virtualenv, packages, optional TLS material. Nothing is
//! rolled back on failure; a partial environment is repaired by running
//! the installer again. When the environment already exists only the TLS
//! material is reconciled with the current configuration, so repeated
//! installs stay side-effect free.

use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use thiserror::Error;

use crate::config::Config;
use crate::paths::StatePaths;
use crate::runner::{CommandRunner, CommandSpec};
use crate::supervisor::{StopError, Supervisor};

const APT_PACKAGES: [&str; 2] = ["python3-venv", "python3-pip"];
const CORE_PACKAGES: [&str; 3] = ["--upgrade", "pip", "notebook"];
const EXTENSION_PACKAGES: [&str; 3] = ["jupyterlab", "jupyterlab-lsp", "python-lsp-server[all]"];
const CERT_DAYS: u32 = 365;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("required tool not found on PATH: {0}")]
    MissingTool(String),
    #[error("{desc} failed with exit status {code}")]
    StepFailed { desc: &'static str, code: i32 },
    #[error("{desc} failed")]
    StepError {
        desc: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum UninstallError {
    #[error("failed to remove {}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Install the notebook environment described by `cfg`.
///
/// No-op when the install directory already exists, apart from bringing
/// the TLS material in line with the configuration.
pub fn install(
    cfg: &Config,
    paths: &StatePaths,
    runner: &dyn CommandRunner,
) -> Result<(), InstallError> {
    if cfg.install_dir.is_dir() {
        info!("already installed at {}", cfg.install_dir.display());
        return reconcile_tls(cfg, paths, runner);
    }

    // Preconditions before any mutating step.
    let python = require(runner, "python3")?;
    if cfg.use_tls {
        require(runner, "openssl")?;
    }

    if runner.find_tool("apt-get").is_some() {
        run_step(runner, "system dependency installation", apt_install())?;
    } else {
        warn!("apt-get not available, skipping system dependency installation");
    }

    run_step(
        runner,
        "virtual environment creation",
        CommandSpec::new(python.display().to_string())
            .args(["-m", "venv"])
            .arg(cfg.install_dir.display().to_string()),
    )?;

    let pip = cfg.install_dir.join("bin").join("pip");
    run_step(
        runner,
        "notebook package installation",
        CommandSpec::new(pip.display().to_string())
            .arg("install")
            .args(CORE_PACKAGES),
    )?;

    if cfg.use_extension {
        run_step(
            runner,
            "LSP extension installation",
            CommandSpec::new(pip.display().to_string())
                .arg("install")
                .args(EXTENSION_PACKAGES),
        )?;
    }

    if cfg.use_tls {
        generate_tls(paths, runner)?;
    } else {
        remove_tls(paths);
    }

    Ok(())
}

/// Remove the environment and every piece of controller state.
///
/// No-op when not installed. A running server is stopped first; removal
/// of state files is best-effort, only the install directory itself is a
/// hard failure.
pub fn uninstall(
    cfg: &Config,
    paths: &StatePaths,
    runner: &dyn CommandRunner,
) -> Result<(), UninstallError> {
    if !cfg.install_dir.is_dir() {
        info!("nothing installed at {}", cfg.install_dir.display());
        return Ok(());
    }

    let supervisor = Supervisor::new(paths, runner);
    match supervisor.stop() {
        Ok(()) => info!("stopped running server before uninstall"),
        Err(StopError::NotRunning) => {}
        Err(e) => warn!("could not stop server cleanly: {e:#}"),
    }

    fs::remove_dir_all(&cfg.install_dir).map_err(|source| UninstallError::Remove {
        path: cfg.install_dir.clone(),
        source,
    })?;

    for stale in [
        &paths.cert_file,
        &paths.key_file,
        &paths.log_file,
        &paths.pid_file,
        &paths.config_file,
    ] {
        let _ = fs::remove_file(stale);
    }

    info!("uninstalled {}", cfg.install_dir.display());
    Ok(())
}

/// Bring TLS material in line with the configuration without touching the
/// rest of an existing installation.
fn reconcile_tls(
    cfg: &Config,
    paths: &StatePaths,
    runner: &dyn CommandRunner,
) -> Result<(), InstallError> {
    if cfg.use_tls {
        if !paths.tls_material_present() {
            require(runner, "openssl")?;
            generate_tls(paths, runner)?;
        }
    } else {
        remove_tls(paths);
    }
    Ok(())
}

fn generate_tls(paths: &StatePaths, runner: &dyn CommandRunner) -> Result<(), InstallError> {
    run_step(
        runner,
        "TLS certificate generation",
        CommandSpec::new("openssl")
            .args(["req", "-x509", "-nodes"])
            .args(["-days", &CERT_DAYS.to_string()])
            .args(["-newkey", "rsa:2048"])
            .arg("-keyout")
            .arg(paths.key_file.display().to_string())
            .arg("-out")
            .arg(paths.cert_file.display().to_string())
            .args(["-subj", "/CN=localhost"]),
    )
}

/// Both halves or neither; removal failures are tolerated.
fn remove_tls(paths: &StatePaths) {
    let _ = fs::remove_file(&paths.cert_file);
    let _ = fs::remove_file(&paths.key_file);
}

fn apt_install() -> CommandSpec {
    let base = if nix::unistd::getuid().is_root() {
        CommandSpec::new("apt-get")
    } else {
        CommandSpec::new("sudo").arg("apt-get")
    };
    base.args(["install", "-y"]).args(APT_PACKAGES)
}

fn run_step(
    runner: &dyn CommandRunner,
    desc: &'static str,
    spec: CommandSpec,
) -> Result<(), InstallError> {
    info!("{desc}: {spec}");
    match runner.run(&spec) {
        Ok(0) => Ok(()),
        Ok(code) => Err(InstallError::StepFailed { desc, code }),
        Err(source) => Err(InstallError::StepError { desc, source }),
    }
}

fn require(runner: &dyn CommandRunner, name: &str) -> Result<PathBuf, InstallError> {
    runner
        .find_tool(name)
        .ok_or_else(|| InstallError::MissingTool(name.to_string()))
}
