//! Uses-constraint resolution: candidate population, package spaces,
//! the package-space consistency checker and the permutation search driver.

pub mod candidates;
pub mod checker;
pub mod conflict;
pub mod context;
pub mod graph;
pub mod packages;
pub mod populate;
pub mod resolver;
pub mod session;
pub mod sources;
