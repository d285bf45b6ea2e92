//! CLI argument parsing for coi-bundle

use clap::Parser;
use coi_core::config::{DEFAULT_SCOPE, DEFAULT_SCRIPT_URL};
use coi_core::CoiConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "coi-bundle")]
#[command(author, version, about = "Pack the service worker module into one deployable script", long_about = None)]
pub struct Cli {
    /// wasm-bindgen glue generated with `--target no-modules`
    #[arg(short, long)]
    pub glue: PathBuf,

    /// Compiled module matching the glue
    #[arg(short, long)]
    pub wasm: PathBuf,

    /// Script to write
    #[arg(short, long, default_value = "enable-threading.js")]
    pub out: PathBuf,

    /// URL the page registers as its service worker
    #[arg(long, default_value = DEFAULT_SCRIPT_URL)]
    pub script_url: String,

    /// Registration scope
    #[arg(long, default_value = DEFAULT_SCOPE)]
    pub scope: String,

    /// Only print errors in the browser console
    #[arg(short, long)]
    pub quiet: bool,

    /// Allow unlimited reloads per session
    #[arg(long)]
    pub no_reload_guard: bool,

    /// Embed a configuration that never registers the worker
    #[arg(long)]
    pub no_register: bool,
}

impl Cli {
    /// Configuration embedded at the top of the generated script.
    pub fn config(&self) -> CoiConfig {
        CoiConfig {
            script_url: self.script_url.clone(),
            scope: self.scope.clone(),
            quiet: self.quiet,
            reload_guard: !self.no_reload_guard,
            should_register: !self.no_register,
        }
    }
}
