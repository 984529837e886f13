//! `control` - run one operation.

use super::{load_config, load_keys};
use anyhow::{Context, Result};
use qslink_devices::{Registry, System};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run `target` and print its output. Ctrl-C cancels the operation.
pub async fn run(config: &Path, keys: &Path, target: &str, args: &[String]) -> Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            interrupt.cancel();
        }
    });

    let output = execute(config, keys, target, args, &cancel).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

pub(crate) async fn execute(
    config: &Path,
    keys: &Path,
    target: &str,
    args: &[String],
    cancel: &CancellationToken,
) -> Result<String> {
    let config = load_config(config)?;
    let keys = load_keys(keys)?;
    let system = System::build(&config, &Registry::default(), Arc::new(keys))?;

    let result = system
        .invoke(target, args, cancel)
        .await
        .with_context(|| format!("failed to run {target}"));
    if let Err(e) = system.close().await {
        warn!(error = %e, "Failed to close connections");
    }
    result
}
