use anyhow::Result;
use std::collections::BTreeSet;

use super::graph::DependencyGraph;
use crate::package::PackageDatabase;
use crate::version::VersionBounds;

/// Installed packages that depend, directly or transitively, on any of `ids`.
///
/// Only installed manifests are consulted; the ids themselves are never part
/// of the result.
pub fn find_dependent_packages<D: PackageDatabase + ?Sized>(
    ids: &[&str],
    database: &D,
) -> Result<BTreeSet<String>> {
    let mut graph = DependencyGraph::new();
    for manifest in database.packages().into_iter().filter_map(|p| p.manifest) {
        let node = graph.get_or_insert(&manifest.id);
        for dependency in &manifest.dependencies {
            let child = graph.get_or_insert(&dependency.id);
            // only reachability matters here
            graph.add_child(node, child, &VersionBounds::UNBOUNDED)?;
        }
    }

    let mut dependents = BTreeSet::new();
    for id in ids {
        let Some(node) = graph.find(id) else {
            continue;
        };
        for ancestor in graph.ancestors(node) {
            dependents.insert(graph.node(ancestor).package_id().to_string());
        }
    }
    for id in ids {
        dependents.remove(*id);
    }
    Ok(dependents)
}
