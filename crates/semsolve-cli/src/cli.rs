//! CLI argument definitions for semsolve.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "semsolve",
    version,
    about = "Resolve semantic version constraints against a registry",
    long_about = "semsolve picks one version per library so that every declared range is \
                  satisfied, backtracking libraries whose ranges conflict."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve root requirements against a registry file
    Resolve {
        /// Registry JSON file: library -> version -> {dependency: range}
        #[arg(short, long)]
        registry: PathBuf,
        /// Root requirement as name=range (repeatable)
        #[arg(long = "require", value_name = "NAME=RANGE")]
        requires: Vec<String>,
        /// JSON file of root requirements: {"name": "range"}
        #[arg(short, long)]
        manifest: Option<PathBuf>,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::List)]
        format: OutputFormat,
        /// Maximum tree depth to display
        #[arg(long)]
        depth: Option<usize>,
        /// Show which libraries require the given library
        #[arg(long)]
        why: Option<String>,
        /// Give up after this many fixpoint passes
        #[arg(long)]
        max_passes: Option<usize>,
        /// Configuration file (defaults to the nearest semsolve.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// One name@version per line
    List,
    /// A JSON object of name -> version
    Json,
    /// The dependency tree
    Tree,
}

pub fn parse() -> Cli {
    Cli::parse()
}
