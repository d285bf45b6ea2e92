//! Build-time packer for the cross-origin isolation script. Reads the
//! wasm-bindgen output and writes the single file that is served both as a
//! page script and as the service worker.

pub mod cli;

use coi_core::bundle::generate_bootstrap_script;
use eyre::{Context, Result};
use log::{debug, info};
use std::fs;

use crate::cli::Cli;

/// Writes the bootstrap script described by `cli` and returns its size in bytes.
pub fn write_bundle(cli: &Cli) -> Result<usize> {
    let config = cli.config();
    config.validate().context("Invalid embedded configuration")?;

    let glue = fs::read_to_string(&cli.glue)
        .with_context(|| format!("Failed to read glue from {}", cli.glue.display()))?;
    let wasm = fs::read(&cli.wasm)
        .with_context(|| format!("Failed to read module from {}", cli.wasm.display()))?;
    debug!("glue {} bytes, module {} bytes", glue.len(), wasm.len());

    let script = generate_bootstrap_script(&config, &glue, &wasm);
    fs::write(&cli.out, &script)
        .with_context(|| format!("Failed to write {}", cli.out.display()))?;
    info!("Wrote {} ({} bytes)", cli.out.display(), script.len());
    Ok(script.len())
}
