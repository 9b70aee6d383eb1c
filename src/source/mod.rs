//! Package sources.
//!
//! A source supplies manifests and installers for exactly one package id.
//! The resolver only talks to a [`SourceRepository`], which maps ids to
//! sources; decorators in `overlay` add ephemeral sources and the hidden
//! base-game packages on top of the database-backed repository.

mod descriptor;
mod factory;
mod github;
mod installed;
mod local_zip;
mod overlay;
mod progress;

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::package::PackageManifest;
use crate::version::{VersionBounds, VersionNumber};

pub use descriptor::{SourceDescriptor, SourceKind};
pub use factory::{DatabaseSourceRepository, SourceFactory};
pub use github::{DEFAULT_API_URL, GitHubInstaller, GitHubReleaseSource};
pub use installed::InstalledSource;
pub use local_zip::{ArchiveInstaller, LocalZipSource};
pub use overlay::{BASE_PACKAGE_PREFIX, BaseGameSource, EphemeralSources, HiddenBaseSources};
pub use progress::{AggregateProgress, ProgressMonitor, ProgressSnapshot};

#[async_trait]
pub trait PackageSource: Send + Sync {
    /// The descriptor to persist for this source, or `None` if it cannot be
    /// remembered across runs.
    fn descriptor(&self) -> Option<SourceDescriptor>;

    /// Returns the first manifest the source offers whose version satisfies
    /// `bounds` and which supports `game_version`.
    ///
    /// Fails with `PackageError::VersionNotAvailable` when nothing matches.
    async fn get_package_manifest(
        &self,
        bounds: &VersionBounds,
        game_version: &VersionNumber,
        monitor: Option<&dyn ProgressMonitor>,
        cancel: &CancellationToken,
    ) -> Result<PackageManifest>;

    /// Returns an installer for a manifest previously returned by
    /// [`PackageSource::get_package_manifest`].
    async fn get_installer(&self, manifest: &PackageManifest) -> Result<Box<dyn PackageInstaller>>;
}

/// Materialises one package version into a directory.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    fn manifest(&self) -> &PackageManifest;

    async fn install(&self, destination: &Path, monitor: Option<&dyn ProgressMonitor>)
    -> Result<()>;
}

/// Maps package ids to sources.
pub trait SourceRepository: Send + Sync {
    /// Fails with `PackageError::PackageNotAvailable` for unknown ids.
    fn get_source(&self, id: &str) -> Result<Arc<dyn PackageSource>>;
}

impl<T: SourceRepository + ?Sized> SourceRepository for Arc<T> {
    fn get_source(&self, id: &str) -> Result<Arc<dyn PackageSource>> {
        (**self).get_source(id)
    }
}

impl<T: SourceRepository + ?Sized> SourceRepository for &T {
    fn get_source(&self, id: &str) -> Result<Arc<dyn PackageSource>> {
        (**self).get_source(id)
    }
}

/// Fails with `PackageError::Cancelled` once `cancel` has fired.
pub(crate) fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(crate::error::PackageError::Cancelled.into());
    }
    Ok(())
}
