//! `config` - inspect the configuration file.

use super::{load_config, load_keys};
use anyhow::Result;
use qslink_devices::{
    Controller, Device, KeyStore, Operation, Operations, Registry, System, SystemConfig,
};
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;

pub fn display(config: &Path, keys: &Path) -> Result<()> {
    let keys = load_keys(keys)?;
    let config = load_config(config)?;
    print!("{}", render_display(&config, &keys)?);
    Ok(())
}

pub fn operations(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    print!("{}", render_operations(&config)?);
    Ok(())
}

/// Key ids, location, then the configuration as YAML. Tokens are never
/// printed.
fn render_display(config: &SystemConfig, keys: &KeyStore) -> Result<String> {
    let mut out = String::from("Keys:\n");
    for (key_id, user) in keys.entries() {
        writeln!(out, "  {key_id} (user {user})")?;
    }
    writeln!(
        out,
        "Location: {}\n",
        config.location.as_deref().unwrap_or("not set")
    )?;
    out.push_str(&config.to_yaml()?);
    Ok(out)
}

/// Controllers then devices, each with its operations and help text.
/// Operations missing from an entry's `operations` map are marked.
///
/// The system is built without credentials; nothing connects.
fn render_operations(config: &SystemConfig) -> Result<String> {
    let system = System::build(config, &Registry::default(), Arc::new(KeyStore::new()))?;
    let mut out = String::new();
    for controller in system.controllers() {
        writeln!(out, "{} ({})", controller.name(), controller.kind())?;
        render_table(
            &mut out,
            controller.operations(),
            system.configured_operations(controller.name()),
        )?;
    }
    for device in system.devices() {
        writeln!(
            out,
            "{} ({}, controller {})",
            device.name(),
            device.kind(),
            device.controller_name()
        )?;
        render_table(
            &mut out,
            device.operations(),
            system.configured_operations(device.name()),
        )?;
    }
    Ok(out)
}

fn render_table(
    out: &mut String,
    operations: &[Operation],
    configured: Option<&Operations>,
) -> std::fmt::Result {
    let width = operations.iter().map(|op| op.name.len()).max().unwrap_or(0);
    for op in operations {
        write!(out, "  {:width$}  {}", op.name, op.help)?;
        match configured.and_then(|ops| ops.get(op.name)) {
            Some(args) if args.is_empty() => writeln!(out)?,
            Some(args) => writeln!(out, " [{}]", args.join(" "))?,
            None => writeln!(out, " (not configured)")?,
        }
    }
    Ok(())
}
