//! qslink - control and inspect a HomeWorks QS installation.
//!
//! ```text
//! qslink control home.getsuntimes
//! qslink control "living room.set" 40
//! qslink config display
//! qslink config operations
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "qslink")]
#[command(author, version, about = "Control HomeWorks QS processors over telnet")]
#[command(propagate_version = true)]
struct Cli {
    /// System configuration file
    #[arg(short, long, env = "QSLINK_CONFIG", default_value = "system.yaml")]
    config: PathBuf,

    /// Credentials file
    #[arg(short, long, env = "QSLINK_KEYS", default_value = "keys.yaml")]
    keys: PathBuf,

    /// Debug logging, unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run an operation on a controller or device
    Control {
        /// Controller or device and operation, as name.operation
        target: String,

        /// Operation arguments
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Inspect the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Print the key ids, location and parsed configuration
    Display,

    /// List the operations of every controller and device
    Operations,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Control { target, args } => {
            commands::control::run(&cli.config, &cli.keys, &target, &args).await
        }
        Commands::Config(ConfigCommands::Display) => {
            commands::config::display(&cli.config, &cli.keys)
        }
        Commands::Config(ConfigCommands::Operations) => commands::config::operations(&cli.config),
    }
}
