//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// The neoterm command line
#[derive(Debug, Parser)]
#[command(
    name = "neoterm",
    version,
    about = "A block-based terminal: every command and its output is one block"
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true, env = "NEOTERM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Interactive mode when omitted
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one command as a block and exit with its exit code
    Exec {
        /// The command line, passed to the shell as one string
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Show command history from the vault
    History {
        /// Only commands containing this text
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum number of entries
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Print in shell history file format, oldest first
        #[arg(long, conflicts_with = "search")]
        export: bool,
    },

    /// List saved bookmarks
    Bookmarks,

    /// Read or change configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the value at a dotted key (e.g. `terminal.cols`)
    Get { key: String },
    /// Set a dotted key and save the file
    Set { key: String, value: String },
    /// Print every key and value
    List,
    /// Print the config file location
    Path,
}

impl Cli {
    pub fn is_interactive(&self) -> bool {
        self.command.is_none()
    }
}
