//! Command-line entry point for running the engine standalone (outside its normal host
//! process), mainly useful for local development and the `--once` smoke-test mode.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Cloud photo sync and cache engine", long_about = None)]
pub struct Cli {
    /// Path to a TOML file providing the same keys as the host's INIT config (§6).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for the catalog database and (when blob storage is disabled) cached
    /// JPEG files.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Run a single CacheEngine + DisplayDispatcher tick and exit, instead of looping.
    #[arg(long)]
    pub once: bool,

    /// Increase log verbosity; repeatable (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Loads the standalone runner's TOML config file and converts it to the same JSON shape
/// the host's `INIT { config }` message carries, so both paths feed [`crate::config::Config`]
/// identically.
pub fn load_config_file(path: &std::path::Path) -> anyhow::Result<serde_json::Value> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| anyhow::anyhow!("Failed reading config at {}: {err}", path.display()))?;
    let table: toml::Value = toml::from_str(&contents)
        .map_err(|err| anyhow::anyhow!("Failed parsing config at {}: {err}", path.display()))?;
    serde_json::to_value(table)
        .map_err(|err| anyhow::anyhow!("Failed converting config to JSON: {err}"))
}
