use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use wp_domain::config::Config;

#[derive(Parser)]
#[command(name = "waypoint", version, about = "Conversational trip-planning agent")]
pub struct Cli {
    /// Path to the TOML config file. Missing file = defaults.
    #[arg(long, global = true, default_value = "waypoint.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the gateway server (the default).
    Serve,
    /// Configuration helpers.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Validate the config file and report issues.
    Validate,
    /// Print the effective configuration (secrets omitted).
    Show,
}

/// Load the config file (defaults when absent) and apply environment
/// overrides.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let mut config = if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    } else {
        Config::default()
    };
    config.apply_env();
    Ok(config)
}
