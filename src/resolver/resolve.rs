use anyhow::Result;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

use super::graph::{DependencyGraph, NodeId};
use crate::error::PackageError;
use crate::logger::Logger;
use crate::package::{PackageDependency, PackageManifest};
use crate::source::{PackageSource, ProgressMonitor, SourceRepository, ensure_not_cancelled};
use crate::version::{VersionBounds, VersionNumber};
use crate::{log_debug, log_error, log_info, log_trace, log_warn};

/// Resolves `candidates` and everything they transitively require into a
/// flat list of manifests to install.
///
/// Nodes are processed breadth first, one at a time. Each source is asked
/// for the node's combined bound and the first manifest it offers is taken;
/// no search for the highest version is made. When a source has nothing
/// inside a bound, every requester whose own declared bound is unsatisfiable
/// is pushed back to an older version and resolution continues. There is no
/// global backtracking: the repair only reaches the immediate requesters.
///
/// Fails with `PackageNotAvailable` when an id has no source,
/// `UnsatisfiableBounds` when requirements on one package do not overlap,
/// `VersionNotAvailable` when no requester can be moved back any further,
/// and `Cancelled` once `cancel` fires. Nothing is installed either way.
pub async fn resolve_dependencies<S: SourceRepository + ?Sized>(
    candidates: &[PackageDependency],
    sources: &S,
    game_version: &VersionNumber,
    monitor: Option<&dyn ProgressMonitor>,
    cancel: &CancellationToken,
    logger: &dyn Logger,
) -> Result<Vec<PackageManifest>> {
    let mut resolution = Resolution {
        sources,
        game_version,
        monitor,
        cancel,
        logger,
        graph: DependencyGraph::new(),
        queue: VecDeque::new(),
    };

    for candidate in candidates {
        let node = resolution.graph.get_or_insert(&candidate.id);
        resolution
            .graph
            .add_child(DependencyGraph::ROOT, node, &candidate.bounds)?;
        resolution.queue.push_back(node);
    }

    resolution.run().await?;

    let graph = &resolution.graph;
    let manifests: Vec<PackageManifest> = graph
        .resolved()
        .into_iter()
        .filter_map(|node| graph.node(node).actualized().cloned())
        .collect();
    log_info!(logger, "Resolved {} packages", manifests.len());
    Ok(manifests)
}

fn is_version_not_available(err: &anyhow::Error) -> bool {
    matches!(
        PackageError::find(err),
        Some(PackageError::VersionNotAvailable { .. })
    )
}

struct Resolution<'r, S: ?Sized> {
    sources: &'r S,
    game_version: &'r VersionNumber,
    monitor: Option<&'r dyn ProgressMonitor>,
    cancel: &'r CancellationToken,
    logger: &'r dyn Logger,
    graph: DependencyGraph,
    queue: VecDeque<NodeId>,
}

impl<S: SourceRepository + ?Sized> Resolution<'_, S> {
    async fn run(&mut self) -> Result<()> {
        while let Some(node) = self.queue.pop_front() {
            ensure_not_cancelled(self.cancel)?;

            let current = self.graph.node(node);
            if current.is_actualized() {
                continue;
            }
            if current.is_floating() {
                log_debug!(self.logger, "Dropping {}: no longer required", current.package_id());
                continue;
            }

            let id = current.package_id().to_string();
            let bounds = self.graph.bounds(node)?;
            let source = self.sources.get_source(&id)?;
            log_trace!(self.logger, "Querying {} {}", id, bounds);

            match source
                .get_package_manifest(&bounds, self.game_version, self.monitor, self.cancel)
                .await
            {
                Ok(manifest) => {
                    log_debug!(self.logger, "Selected {} {}", id, manifest.version);
                    self.accept(node, manifest)?;
                }
                Err(e) if is_version_not_available(&e) => {
                    self.repair(node, source.as_ref(), e).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Actualizes `node` and links and queues its dependencies. A dependency
    /// already resolved to a version the new bound excludes is resolved again.
    fn accept(&mut self, node: NodeId, manifest: PackageManifest) -> Result<()> {
        let dependencies = manifest.dependencies.clone();
        let id = manifest.id.clone();
        self.graph.actualize(node, manifest)?;

        for dependency in &dependencies {
            if dependency.id == id {
                log_warn!(self.logger, "Ignoring dependency of {} on itself", id);
                continue;
            }
            let child = self.graph.get_or_insert(&dependency.id);
            self.graph.add_child(node, child, &dependency.bounds)?;

            let resolved_version = self.graph.node(child).actualized().map(|m| m.version);
            if let Some(version) = resolved_version {
                let bounds = self.graph.bounds(child)?;
                if !bounds.contains(&version) {
                    log_info!(
                        self.logger,
                        "{} {} no longer satisfies {}, resolving it again",
                        dependency.id,
                        version,
                        bounds
                    );
                    self.graph.remove_actualization(child);
                }
            }
            self.queue.push_back(child);
        }
        Ok(())
    }

    /// Handles a source that had nothing inside the node's bound.
    ///
    /// For each requester, the source is asked again with only that
    /// requester's declared bound. A requester whose own bound cannot be met
    /// is un-resolved and restricted to versions older than the one it had.
    /// If no requester could be moved, `failure` is returned.
    async fn repair(
        &mut self,
        node: NodeId,
        source: &dyn PackageSource,
        failure: anyhow::Error,
    ) -> Result<()> {
        let id = self.graph.node(node).package_id().to_string();
        let parents: Vec<NodeId> = self
            .graph
            .node(node)
            .parents()
            .keys()
            .copied()
            .filter(|&p| p != DependencyGraph::ROOT)
            .collect();

        let mut demoted = false;
        for parent in parents {
            let Some(requester) = self.graph.node(parent).actualized().cloned() else {
                continue;
            };
            let declared = requester
                .dependency_bounds(&id)?
                .unwrap_or(VersionBounds::UNBOUNDED);

            ensure_not_cancelled(self.cancel)?;
            match source
                .get_package_manifest(&declared, self.game_version, self.monitor, self.cancel)
                .await
            {
                Ok(_) => {
                    log_debug!(
                        self.logger,
                        "{} {} alone can have {} {}",
                        requester.id,
                        requester.version,
                        id,
                        declared
                    );
                }
                Err(e) if is_version_not_available(&e) => {
                    log_warn!(
                        self.logger,
                        "{} {} requires {} {}, which is not available; trying an older {}",
                        requester.id,
                        requester.version,
                        id,
                        declared,
                        requester.id
                    );
                    self.graph.remove_actualization(parent);
                    self.graph
                        .restrict(parent, &VersionBounds::below(requester.version))?;
                    self.queue.push_back(parent);
                    demoted = true;
                }
                Err(e) => return Err(e),
            }
        }

        if !demoted {
            log_error!(self.logger, "{:#}", failure);
            return Err(failure);
        }
        self.queue.push_back(node);
        Ok(())
    }
}
