//! Dependency resolution.
//!
//! [`resolve_dependencies`] turns a set of requested packages into the flat
//! list of manifests to install; [`find_dependent_packages`] answers the
//! reverse question for uninstalls. Both build a [`DependencyGraph`].

mod dependents;
mod graph;
mod resolve;

pub use dependents::find_dependent_packages;
pub use graph::{DependencyGraph, DependencyNode, NodeId};
pub use resolve::resolve_dependencies;
