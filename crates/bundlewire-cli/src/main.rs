//! bundlewire CLI binary.
//!
//! This is the entry point for the `bundlewire` command-line tool. It loads
//! the user configuration, initializes logging via `tracing`, parses
//! arguments with `clap`, and dispatches to the appropriate command handler.

mod cli;
mod commands;

use miette::Result;

use bundlewire_core::config::Config;

fn main() -> Result<()> {
    let args = cli::parse();
    let config = Config::load(args.config.as_deref())?;

    let default_level = if args.verbose {
        "debug"
    } else {
        config.log.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    commands::dispatch(args, config)
}
