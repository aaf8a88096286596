use anyhow::bail;
use clap::{crate_version, Parser};
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

use std::env;
use std::path::PathBuf;

mod defaults;
mod utils;
use utils::constants::PILOT_HOME;

mod pilot_commands;
use pilot_commands::*;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// The directory named by `BCBIO_PILOT_HOME`, which holds the program registry
/// and the saved run options.
fn get_pilot_home() -> anyhow::Result<PathBuf> {
    match env::var(PILOT_HOME) {
        Ok(p) => Ok(PathBuf::from(p)),
        Err(e) => {
            bail!(
                "${} is unset {}, please set this environment variable to continue.",
                PILOT_HOME,
                e
            );
        }
    }
}

fn ensure_pilot_home() -> anyhow::Result<PathBuf> {
    let pilot_home_path = get_pilot_home()?;
    if !pilot_home_path.is_dir() {
        info!(
            "The {} directory, {}, doesn't exist, creating...",
            PILOT_HOME,
            pilot_home_path.display()
        );
        std::fs::create_dir_all(&pilot_home_path)?;
    }
    Ok(pilot_home_path)
}

fn main() -> anyhow::Result<()> {
    // Check the `RUST_LOG` variable for the logger level and
    // respect the value found there. If this environment
    // variable is not set then set the logging level to
    // INFO.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    const VERSION: &str = crate_version!();

    let cli_args = Cli::parse();

    match cli_args.command {
        Commands::SetPaths { .. } => get_pilot_home().and_then(|h| set_paths(h, cli_args.command)),
        Commands::Inspect {} => get_pilot_home().and_then(|h| inspect_pilot(VERSION, h)),
        Commands::RefreshProgInfo {} => get_pilot_home().and_then(refresh_prog_info),
        Commands::Config(ConfigOpts { command }) => {
            ensure_pilot_home().and_then(|h| configure(h, command))
        }
        Commands::Run {} => ensure_pilot_home().and_then(run_pipeline),
        // the helper also runs standalone, without a registry
        Commands::Helper(opts) => run_helper(get_pilot_home().ok(), opts),
        Commands::Doctor(opts) => run_doctor(opts),
    }
}
