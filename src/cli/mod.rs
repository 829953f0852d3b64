// CLI module - Command line front end
//
// This module contains:
// - Cli / Command: clap definitions of the `pzmm` command line
// - CliController: runs a command against the SessionManager and writes the result

pub mod controller;

pub use controller::CliController;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Default directory holding `PZ Mod Manager.yaml`.
pub const DEFAULT_CONFIG_DIR: &str = "PZ Mod Manager Data";

/// Manage the mod list of a Project Zomboid dedicated server.
#[derive(Debug, Parser)]
#[command(name = "pzmm", version, about, long_about = None)]
pub struct Cli {
    /// Server configuration file (defaults to the last opened one)
    #[arg(short, long, global = true)]
    pub file: Option<Utf8PathBuf>,

    /// Directory of the settings file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_DIR)]
    pub config_dir: Utf8PathBuf,

    /// Directory for log files
    #[arg(long, global = true, default_value = "logs")]
    pub log_dir: Utf8PathBuf,

    /// Also log to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug level logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Show the mod list
    List,

    /// Add a mod by workshop id or workshop URL
    Add {
        /// Workshop id or URL
        id_or_url: String,

        /// Mod id provided by the workshop item
        #[arg(long)]
        mod_id: Option<String>,

        /// Insert at this position instead of the end
        #[arg(long)]
        at: Option<usize>,
    },

    /// Remove the entry at a position
    Remove { order: usize },

    /// Move an entry to another position
    Move { from: usize, to: usize },

    /// Enable the entry at a position
    Enable { order: usize },

    /// Disable the entry at a position
    Disable { order: usize },

    /// Enable every entry
    EnableAll,

    /// Disable every entry
    DisableAll,

    /// Fill missing ids and names from local workshop content
    Scan {
        /// Workshop directory (defaults to the configured one)
        #[arg(long)]
        path: Option<Utf8PathBuf>,

        /// Show what would change without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve display names through the Steam Web API
    Names,

    /// Print the lists formatted for Docker environment variables
    Export {
        /// Only print the workshop id list
        #[arg(long, conflicts_with = "mods")]
        workshop: bool,

        /// Only print the mod id list
        #[arg(long)]
        mods: bool,
    },

    /// Show server settings
    Settings {
        /// Only keys containing this text (case-insensitive)
        filter: Option<String>,
    },

    /// Change a server setting
    Set { key: String, value: String },

    /// Write the configuration and its disabled mods under a new file name
    SaveAs { path: Utf8PathBuf },
}

impl Command {
    /// True for commands that only read the configuration file.
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Command::List | Command::Names | Command::Export { .. } | Command::Settings { .. }
        )
    }
}
