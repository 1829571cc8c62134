//! Command-line interface definitions.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

/// Poolkeeper - connection lifecycle manager for relational stores.
#[derive(Parser, Debug)]
#[command(name = "poolkeeper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the manager and serve the ops endpoints until Ctrl-C
    Serve(ServeArgs),

    /// Probe both pools once and report health
    Check(ConfigPathArg),

    /// Create the built-in tables if missing
    InitDb(ConfigPathArg),

    /// Print the blocking pool occupancy
    PoolStatus(ConfigPathArg),
}

impl Commands {
    /// Config file named by the selected subcommand.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        match self {
            Self::Serve(args) => &args.config,
            Self::Check(args) | Self::InitDb(args) | Self::PoolStatus(args) => &args.config,
        }
    }
}

/// Shared argument for commands that only need a config path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Path to configuration file
    #[arg(short, long, default_value = "poolkeeper.toml")]
    pub config: PathBuf,
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "poolkeeper.toml")]
    pub config: PathBuf,

    /// Override the listen address from the config file
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}
