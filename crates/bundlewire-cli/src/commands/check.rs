//! Check command implementation.

use std::path::Path;

use miette::Result;

use bundlewire_core::config::Config;
use bundlewire_core::manifest::Repository;
use bundlewire_resolver::context::RepositoryContext;
use bundlewire_resolver::resolver::Resolver;

pub fn exec(repo: &Repository, config: &Config, path: &Path) -> Result<()> {
    let resolution = Resolver::new(config.resolver.clone()).resolve(&RepositoryContext::new(repo))?;
    println!(
        "{}: {} resource(s) consistent after {} permutation(s)",
        path.display(),
        resolution.wires.len(),
        resolution.attempts
    );
    if !resolution.dropped.is_empty() {
        println!(
            "warning: {} optional resource(s) could not be resolved",
            resolution.dropped.len()
        );
    }
    Ok(())
}
