//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// gitvault - durable key/value storage on a Git repository
///
/// Mirrors JSON documents from a GitHub repository in memory and writes
/// changes back with optimistic concurrency.
#[derive(Parser, Debug)]
#[command(name = "gitvault")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "GITVAULT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show cache and data statistics
    Status,

    /// Print the JSON stored at a path
    Get(GetArgs),

    /// Store a JSON value at a path and flush it
    Set(SetArgs),

    /// Write every cached path to the remote
    Flush,

    /// Copy every cached path under data/backup/
    Backup,

    /// Store or fetch values too large for a single file
    Large(LargeArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Repository path, e.g. data/users.json
    pub path: String,
}

/// Arguments for the set command
#[derive(Parser, Debug)]
pub struct SetArgs {
    /// Repository path, e.g. data/users.json
    pub path: String,

    /// JSON value to store
    pub value: String,
}

/// Arguments for the large command
#[derive(Parser, Debug)]
pub struct LargeArgs {
    #[command(subcommand)]
    pub action: LargeAction,
}

/// Large object subcommands
#[derive(Subcommand, Debug)]
pub enum LargeAction {
    /// Store the JSON document in FILE under NAME
    Put {
        /// Object name
        name: String,

        /// File containing a JSON document
        file: PathBuf,
    },

    /// Print (or write) the JSON stored under NAME
    Get {
        /// Object name
        name: String,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete NAME and all of its chunks
    Rm {
        /// Object name
        name: String,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}
