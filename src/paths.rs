//! On-disk locations for controller state
//!
//! Config lives in the platform config directory; runtime state (PID file,
//! server log, TLS material) lives in the platform data directory. The
//! managed venv itself is placed wherever the configuration points.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const CONFIG_FILE: &str = "nbctl.conf";
const PID_FILE: &str = "notebook.pid";
const LOG_FILE: &str = "notebook.log";
const CERT_FILE: &str = "server.crt";
const KEY_FILE: &str = "server.key";

/// Resolved locations of every file the controller owns.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub config_file: PathBuf,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl StatePaths {
    /// Discover standard per-user locations and make sure they exist.
    pub fn discover() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("nbctl");
        let state_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
            .join("nbctl");

        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;
        fs::create_dir_all(&state_dir)
            .with_context(|| format!("Failed to create {}", state_dir.display()))?;

        Ok(Self::layout(&config_dir, &state_dir))
    }

    /// Place config and state under a single root. Used by tests.
    pub fn under(root: &Path) -> Self {
        Self::layout(root, root)
    }

    fn layout(config_dir: &Path, state_dir: &Path) -> Self {
        Self {
            config_file: config_dir.join(CONFIG_FILE),
            pid_file: state_dir.join(PID_FILE),
            log_file: state_dir.join(LOG_FILE),
            cert_file: state_dir.join(CERT_FILE),
            key_file: state_dir.join(KEY_FILE),
        }
    }

    /// True when both halves of the TLS material are on disk.
    pub fn tls_material_present(&self) -> bool {
        self.cert_file.exists() && self.key_file.exists()
    }
}
