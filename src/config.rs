//! Controller configuration
//!
//! Four scalar settings persisted as flat `KEY="value"` lines so the file
//! stays hand-editable. Loading never fails: a missing file or an
//! unparsable field falls back to the documented default, and `save`
//! always rewrites the complete state.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;

const KEY_INSTALL_DIR: &str = "INSTALL_DIR";
const KEY_PORT: &str = "PORT";
const KEY_USE_TLS: &str = "USE_TLS";
const KEY_USE_EXTENSION: &str = "USE_EXTENSION";

pub const DEFAULT_PORT: u16 = 8888;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the managed virtualenv.
    pub install_dir: PathBuf,
    /// Port the notebook server listens on.
    pub port: u16,
    /// Serve over HTTPS with a self-signed certificate.
    pub use_tls: bool,
    /// Install the JupyterLab LSP extension alongside the core package.
    pub use_extension: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_dir: default_install_dir(),
            port: DEFAULT_PORT,
            use_tls: false,
            use_extension: false,
        }
    }
}

fn default_install_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".local")
                .join("share")
        })
        .join("nbctl")
        .join("venv")
}

impl Config {
    /// Load from `path`, substituting defaults for anything absent or
    /// unreadable. Unknown keys are ignored.
    pub fn load(path: &Path) -> Self {
        let mut cfg = Self::default();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => return cfg,
        };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, raw)) = line.split_once('=') else {
                continue;
            };
            let value = unquote(raw.trim());
            match key.trim() {
                KEY_INSTALL_DIR => {
                    if !value.is_empty() {
                        cfg.install_dir = PathBuf::from(value);
                    }
                }
                KEY_PORT => match value.parse::<u16>() {
                    Ok(port) if port > 0 => cfg.port = port,
                    _ => warn!("ignoring invalid {KEY_PORT} value {value:?}"),
                },
                KEY_USE_TLS => cfg.use_tls = parse_bool(value).unwrap_or(cfg.use_tls),
                KEY_USE_EXTENSION => {
                    cfg.use_extension = parse_bool(value).unwrap_or(cfg.use_extension);
                }
                _ => {}
            }
        }
        cfg
    }

    /// Write the full in-memory state, replacing the file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", path.display()))?;
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .context("Failed to create temporary config file")?;
        write!(tmp, "{}", self.render()).context("Failed to write config")?;
        tmp.persist(path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }

    fn render(&self) -> String {
        format!(
            "{KEY_INSTALL_DIR}=\"{}\"\n{KEY_PORT}=\"{}\"\n{KEY_USE_TLS}=\"{}\"\n{KEY_USE_EXTENSION}=\"{}\"\n",
            self.install_dir.display(),
            self.port,
            self.use_tls,
            self.use_extension,
        )
    }
}

fn unquote(raw: &str) -> &str {
    raw.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(raw)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}
