//! Handler for `bundlewire tree`.

use miette::Result;

use bundlewire_core::config::Config;
use bundlewire_core::manifest::Repository;
use bundlewire_resolver::context::RepositoryContext;
use bundlewire_resolver::graph::WiringGraph;
use bundlewire_resolver::resolver::Resolver;

pub fn exec(
    repo: &Repository,
    config: &Config,
    depth: Option<u32>,
    why: Option<String>,
    invert: Option<String>,
    conflicts: bool,
) -> Result<()> {
    let resolution = Resolver::new(config.resolver.clone()).resolve(&RepositoryContext::new(repo))?;

    if conflicts {
        if resolution.conflicts.is_empty() {
            println!("No uses conflicts.");
        } else {
            print!("{}", resolution.conflicts);
        }
        return Ok(());
    }

    let graph = WiringGraph::build(&repo.graph, &repo.wirings, Some(&resolution), &repo.roots);

    if let Some(ref target) = why {
        if let Some(path) = graph.find_path(target) {
            println!("Path to {target}:");
            for (i, node) in path.iter().enumerate() {
                let indent = "  ".repeat(i);
                println!("{indent}{node}");
            }
        } else {
            println!("Resource '{target}' is not wired to any root.");
        }
        return Ok(());
    }

    if let Some(ref target) = invert {
        let inverted = graph.print_inverted_tree(target);
        if inverted.is_empty() {
            println!("Resource '{target}' not found in the wiring.");
        } else {
            print!("{inverted}");
        }
        return Ok(());
    }

    let tree = graph.print_tree(depth.map(|d| d as usize));
    if tree.is_empty() {
        println!("No roots to show.");
    } else {
        print!("{tree}");
    }
    Ok(())
}
