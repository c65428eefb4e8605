//! CLI argument definitions for bundlewire.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "bundlewire",
    version,
    about = "Resolve OSGi-style resources under uses constraints",
    long_about = "bundlewire wires the requirements of bundles and fragments to capabilities \
                  of other resources, backtracking over candidate choices until every \
                  resource sees a single consistent provider for each package."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Repository description to resolve (default: nearest repository.toml)
    #[arg(short, long, global = true, env = "BUNDLEWIRE_REPO")]
    pub repo: Option<PathBuf>,

    /// Configuration file (default: ~/.bundlewire/config.toml)
    #[arg(long, global = true, env = "BUNDLEWIRE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve the repository roots and print the new wires
    Resolve {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the wiring tree of the resolved roots
    Tree {
        /// Maximum depth
        #[arg(long)]
        depth: Option<u32>,
        /// Explain why a resource is wired in (name, name@version or name/version)
        #[arg(long)]
        why: Option<String>,
        /// Show the resources wired to this one instead
        #[arg(long)]
        invert: Option<String>,
        /// Show the uses conflicts the resolve recovered from
        #[arg(long)]
        conflicts: bool,
    },

    /// Check that the repository resolves without printing wires
    Check,
}

pub fn parse() -> Cli {
    Cli::parse()
}
