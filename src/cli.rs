//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Generate dynamic help text for the interface argument
fn interface_help() -> String {
    format!(
        "Interface to open, repeat in pool order [available: {}]",
        rservo_interfaces::interface_names_short()
    )
}

#[derive(Parser)]
#[command(name = "rservod")]
#[command(author, version, about = "Debug board control daemon", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Control document to load (TOML), repeatable
    #[arg(short, long = "config", global = true)]
    pub configs: Vec<PathBuf>,

    #[arg(short, long = "interface", global = true, help = interface_help())]
    pub interfaces: Vec<String>,

    /// Directory searched for control documents and their includes
    #[arg(long = "search-path", global = true)]
    pub search_paths: Vec<PathBuf>,

    /// Apply init values before running the command
    #[arg(long, global = true)]
    pub init: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read controls
    Get {
        /// Control names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Write controls, in order
    Set {
        /// Assignments in name:value form
        #[arg(required = true)]
        assignments: Vec<String>,
    },

    /// Show the documentation string of a control
    Doc {
        /// Control name
        name: String,
    },

    /// Show every map and control with its parameters
    DocAll,

    /// Apply the init value of every control that declares one
    Hwinit,

    /// Read every control
    GetAll {
        /// Include each control's documentation
        #[arg(long = "verbose", id = "verbose_listing")]
        verbose: bool,
    },

    /// List supported interface adapters
    ListInterfaces,

    /// Run name and name:value requests read from stdin, one per line
    Shell,
}
