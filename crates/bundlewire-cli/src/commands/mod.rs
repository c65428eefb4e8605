//! Command dispatch and handler modules.

mod check;
mod resolve;
mod tree;

use std::path::{Path, PathBuf};

use miette::Result;

use bundlewire_core::config::Config;
use bundlewire_core::manifest::{Manifest, Repository};
use bundlewire_util::errors::WiringError;
use bundlewire_util::fs::find_ancestor_with;

use crate::cli::{Cli, Command};

const REPOSITORY_FILE: &str = "repository.toml";

/// Route a parsed CLI invocation to the appropriate command handler.
pub fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let repo_path = repository_path(cli.repo.as_deref())?;
    tracing::debug!("loading repository from {}", repo_path.display());
    let repo = load_repository(&repo_path)?;

    match cli.command {
        Command::Resolve { json } => resolve::exec(&repo, &config, json),
        Command::Tree {
            depth,
            why,
            invert,
            conflicts,
        } => tree::exec(&repo, &config, depth, why, invert, conflicts),
        Command::Check => check::exec(&repo, &config, &repo_path),
    }
}

/// The explicit `--repo` path, or the nearest `repository.toml` upwards
/// from the current directory.
fn repository_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(WiringError::Io)?;
    let root = find_ancestor_with(&cwd, REPOSITORY_FILE).ok_or_else(|| WiringError::Repository {
        message: format!("Could not find {REPOSITORY_FILE} in this directory or any parent"),
    })?;
    Ok(root.join(REPOSITORY_FILE))
}

fn load_repository(path: &Path) -> Result<Repository> {
    let manifest = Manifest::from_path(path)?;
    Ok(manifest.into_repository()?)
}
