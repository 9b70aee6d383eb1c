use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{PackageInstaller, PackageSource, ProgressMonitor, SourceDescriptor};
use crate::error::PackageError;
use crate::package::PackageManifest;
use crate::version::{VersionBounds, VersionNumber};

/// Source for a package that is installed but has no remembered upstream.
///
/// It offers exactly the installed manifest, so the package can satisfy
/// dependencies, but it cannot install anything.
pub struct InstalledSource {
    manifest: PackageManifest,
}

impl InstalledSource {
    pub fn new(manifest: PackageManifest) -> Self {
        Self { manifest }
    }
}

#[async_trait]
impl PackageSource for InstalledSource {
    fn descriptor(&self) -> Option<SourceDescriptor> {
        None
    }

    async fn get_package_manifest(
        &self,
        bounds: &VersionBounds,
        _game_version: &VersionNumber,
        _monitor: Option<&dyn ProgressMonitor>,
        _cancel: &CancellationToken,
    ) -> Result<PackageManifest> {
        if bounds.contains(&self.manifest.version) {
            return Ok(self.manifest.clone());
        }
        Err(PackageError::VersionNotAvailable {
            id: self.manifest.id.clone(),
            bounds: bounds.to_string(),
        }
        .into())
    }

    async fn get_installer(&self, manifest: &PackageManifest) -> Result<Box<dyn PackageInstaller>> {
        Err(PackageError::Unsupported {
            id: manifest.id.clone(),
            operation: "reinstall".to_string(),
        }
        .into())
    }
}
