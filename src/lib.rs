//! nbctl library
//!
//! Installer, configuration store, and process supervisor for a managed
//! Jupyter notebook server, plus the argument handling for the
//! `tokenizer-train` wrapper binary.

pub mod config;
pub mod installer;
pub mod paths;
pub mod runner;
pub mod supervisor;
pub mod train;
pub mod wizard;
