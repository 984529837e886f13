//! Subcommand implementations.

pub mod config;
pub mod control;

use anyhow::{Context, Result};
use qslink_devices::{KeyStore, SystemConfig};
use std::path::Path;

pub(crate) fn load_config(path: &Path) -> Result<SystemConfig> {
    SystemConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
}

pub(crate) fn load_keys(path: &Path) -> Result<KeyStore> {
    KeyStore::load(path).with_context(|| format!("failed to load {}", path.display()))
}
