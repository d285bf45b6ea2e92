use clap::Parser;
use eyre::{Context, Result};

use coi_bundle::cli::Cli;
use coi_bundle::write_bundle;

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    write_bundle(&cli)?;
    Ok(())
}
