//! Install and uninstall flows built from resolution and the database.

use anyhow::{Context, Result};
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::logger::Logger;
use crate::package::{PackageDatabase, PackageDependency};
use crate::resolver::{find_dependent_packages, resolve_dependencies};
use crate::source::{ProgressMonitor, SourceRepository, ensure_not_cancelled};
use crate::version::{VersionBounds, VersionNumber};
use crate::{log_debug, log_error, log_info};

/// Resolves `candidates` and installs every resolved package that is not
/// already present at the resolved version.
///
/// Installs run concurrently. A failing install does not stop the others;
/// every failure is logged and the first one is returned once all have
/// finished. Returns the ids that were installed.
#[tracing::instrument(skip_all)]
pub async fn install_packages<S, D>(
    candidates: &[PackageDependency],
    sources: &S,
    database: &D,
    game_version: &VersionNumber,
    monitor: Option<&dyn ProgressMonitor>,
    cancel: &CancellationToken,
    logger: &dyn Logger,
) -> Result<Vec<String>>
where
    S: SourceRepository + ?Sized,
    D: PackageDatabase + ?Sized,
{
    let resolved =
        resolve_dependencies(candidates, sources, game_version, monitor, cancel, logger).await?;

    let pending: Vec<_> = resolved
        .into_iter()
        .filter(|manifest| {
            let exact = VersionBounds::exact(manifest.version);
            let present = database.contains(&manifest.id, Some(&exact));
            if present {
                log_debug!(logger, "{} {} is already installed", manifest.id, manifest.version);
            }
            !present
        })
        .collect();

    if pending.is_empty() {
        log_info!(logger, "Nothing to install");
        return Ok(Vec::new());
    }
    ensure_not_cancelled(cancel)?;

    let mut installers = Vec::with_capacity(pending.len());
    for manifest in &pending {
        let source = sources.get_source(&manifest.id)?;
        let installer = source
            .get_installer(manifest)
            .await
            .with_context(|| format!("No installer for {} {}", manifest.id, manifest.version))?;
        installers.push(installer);
    }

    let results = join_all(
        installers
            .iter()
            .map(|installer| database.install_package(installer.as_ref(), monitor)),
    )
    .await;

    let mut installed = Vec::with_capacity(installers.len());
    let mut first_error = None;
    for (installer, result) in installers.iter().zip(results) {
        let manifest = installer.manifest();
        match result {
            Ok(()) => {
                log_info!(logger, "Installed {} {}", manifest.id, manifest.version);
                installed.push(manifest.id.clone());
            }
            Err(e) => {
                log_error!(logger, "{:#}", e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(installed),
    }
}

/// Uninstalls `ids`, refusing if another installed package still needs one
/// of them.
#[tracing::instrument(skip_all)]
pub fn uninstall_packages<D: PackageDatabase + ?Sized>(
    ids: &[&str],
    database: &D,
    logger: &dyn Logger,
) -> Result<()> {
    let dependents = find_dependent_packages(ids, database)?;
    if !dependents.is_empty() {
        let dependents: Vec<_> = dependents.into_iter().collect();
        anyhow::bail!(
            "Cannot uninstall {}: still required by {}",
            ids.join(", "),
            dependents.join(", ")
        );
    }

    for id in ids {
        database
            .uninstall(id)
            .with_context(|| format!("Failed to uninstall {}", id))?;
        log_info!(logger, "Removed {}", id);
    }
    Ok(())
}
