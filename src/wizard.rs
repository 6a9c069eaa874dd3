//! Interactive configuration wizard
//!
//! Walks the operator through the four settings, seeded with the current
//! values, and persists only on explicit confirmation. Esc at any prompt
//! cancels the wizard without persisting, same as declining the final
//! confirmation.

use std::path::{Path, PathBuf};

use anyhow::Result;
use inquire::{Confirm, CustomType, InquireError, Text};

use crate::config::Config;

/// Collect settings interactively. Returns `None` (nothing persisted)
/// when the operator cancels or declines the final confirmation.
pub fn run(current: &Config, config_path: &Path) -> Result<Option<Config>> {
    let current_dir = current.install_dir.display().to_string();
    let Some(install_dir) = prompt_or_cancel(
        Text::new("Install directory:")
            .with_default(&current_dir)
            .with_help_message("The Python virtualenv for the notebook server is created here")
            .prompt(),
    )?
    else {
        return Ok(None);
    };

    let Some(port) = prompt_or_cancel(
        CustomType::<u16>::new("Server port:")
            .with_default(current.port)
            .with_error_message("Enter a valid port number")
            .prompt(),
    )?
    else {
        return Ok(None);
    };

    let Some(use_tls) = prompt_or_cancel(
        Confirm::new("Serve over HTTPS with a self-signed certificate?")
            .with_default(current.use_tls)
            .with_help_message("A certificate/key pair is generated with openssl during install")
            .prompt(),
    )?
    else {
        return Ok(None);
    };

    let Some(use_extension) = prompt_or_cancel(
        Confirm::new("Install the JupyterLab LSP extension?")
            .with_default(current.use_extension)
            .with_help_message("Adds jupyterlab-lsp and python-lsp-server to the environment")
            .prompt(),
    )?
    else {
        return Ok(None);
    };

    let cfg = Config {
        install_dir: PathBuf::from(install_dir.trim()),
        port,
        use_tls,
        use_extension,
    };

    println!("\nSettings:");
    println!("  install directory: {}", cfg.install_dir.display());
    println!("  port:              {}", cfg.port);
    println!("  TLS:               {}", if cfg.use_tls { "enabled" } else { "disabled" });
    println!("  LSP extension:     {}", if cfg.use_extension { "yes" } else { "no" });
    println!();

    let proceed = prompt_or_cancel(
        Confirm::new("Save these settings?")
            .with_default(true)
            .prompt(),
    )?;
    if proceed != Some(true) {
        return Ok(None);
    }

    cfg.save(config_path)?;
    Ok(Some(cfg))
}

/// Esc (or Ctrl-C) on a prompt means "cancel the wizard", not an error.
pub fn prompt_or_cancel<T>(result: Result<T, InquireError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
        Err(e) => Err(anyhow::anyhow!("Prompt failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_prompt_maps_to_none() {
        let result = prompt_or_cancel(Err::<bool, _>(InquireError::OperationCanceled)).unwrap();
        assert!(result.is_none());
        let result = prompt_or_cancel(Err::<bool, _>(InquireError::OperationInterrupted)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn answered_prompt_passes_through() {
        assert_eq!(prompt_or_cancel(Ok(7u16)).unwrap(), Some(7));
    }

    #[test]
    fn other_prompt_errors_propagate() {
        let err = prompt_or_cancel(Err::<bool, _>(InquireError::NotTTY)).unwrap_err();
        assert!(err.to_string().contains("Prompt failed"));
    }
}
