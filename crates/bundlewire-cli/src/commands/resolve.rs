//! Handler for `bundlewire resolve`.

use miette::Result;

use bundlewire_core::config::Config;
use bundlewire_core::manifest::Repository;
use bundlewire_core::model::namespace;
use bundlewire_resolver::context::RepositoryContext;
use bundlewire_resolver::resolver::Resolver;
use bundlewire_util::errors::WiringError;

pub fn exec(repo: &Repository, config: &Config, json: bool) -> Result<()> {
    let resolver = Resolver::new(config.resolver.clone());
    let resolution = resolver.resolve(&RepositoryContext::new(repo))?;
    let summary = resolution.summary(&repo.graph);

    if json {
        let out = serde_json::to_string_pretty(&summary).map_err(|e| WiringError::Generic {
            message: format!("Failed to serialize resolution: {e}"),
        })?;
        println!("{out}");
        return Ok(());
    }

    println!(
        "Resolved {} resource(s) in {} permutation(s)",
        summary.resources.len(),
        summary.attempts
    );
    for resource in &summary.resources {
        if resource.fragment {
            println!("{} (fragment)", resource.resource);
        } else {
            println!("{}", resource.resource);
        }
        for wire in &resource.wires {
            match (&wire.package, wire.namespace.as_str()) {
                (Some(package), namespace::PACKAGE) => {
                    println!("  import {package} -> {}", wire.provider)
                }
                (_, namespace::BUNDLE) => println!("  require-bundle -> {}", wire.provider),
                (_, namespace::HOST) => println!("  host -> {}", wire.provider),
                _ => println!("  {} {} -> {}", wire.namespace, wire.filter, wire.provider),
            }
        }
    }
    for dropped in &summary.dropped {
        println!("Dropped optional resource {dropped}");
    }
    if !resolution.conflicts.is_empty() {
        print!("{}", resolution.conflicts);
    }
    Ok(())
}
