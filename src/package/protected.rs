use anyhow::Result;
use async_trait::async_trait;

use super::{InstalledPackage, PackageDatabase, PackageManifest};
use crate::error::PackageError;
use crate::source::{BASE_PACKAGE_PREFIX, PackageInstaller, ProgressMonitor, SourceDescriptor};
use crate::version::{VersionBounds, VersionNumber};

/// Database view that treats the base game's own packages as always
/// installed and refuses to modify them.
///
/// Ids starting with [`BASE_PACKAGE_PREFIX`] are intercepted; everything
/// else goes to the wrapped database unchanged.
pub struct ProtectedDatabase<D> {
    inner: D,
    game_version: VersionNumber,
}

impl<D: PackageDatabase> ProtectedDatabase<D> {
    pub fn new(inner: D, game_version: VersionNumber) -> Self {
        Self {
            inner,
            game_version,
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    fn is_protected(id: &str) -> bool {
        id.starts_with(BASE_PACKAGE_PREFIX)
    }

    fn refuse(id: &str, operation: &str) -> anyhow::Error {
        PackageError::Unsupported {
            id: id.to_string(),
            operation: operation.to_string(),
        }
        .into()
    }
}

#[async_trait]
impl<D: PackageDatabase> PackageDatabase for ProtectedDatabase<D> {
    fn packages(&self) -> Vec<InstalledPackage> {
        self.inner.packages()
    }

    fn get(&self, id: &str) -> Option<InstalledPackage> {
        self.inner.get(id)
    }

    fn contains(&self, id: &str, bounds: Option<&VersionBounds>) -> bool {
        Self::is_protected(id) || self.inner.contains(id, bounds)
    }

    fn installed_manifest(&self, id: &str) -> Result<PackageManifest> {
        match self.inner.installed_manifest(id) {
            Err(_) if Self::is_protected(id) => Ok(PackageManifest::new(id, self.game_version)),
            other => other,
        }
    }

    fn add_package_source(&self, id: &str, source: SourceDescriptor) -> Result<()> {
        if Self::is_protected(id) {
            return Err(Self::refuse(id, "add a source to base"));
        }
        self.inner.add_package_source(id, source)
    }

    fn remove_package_source(&self, id: &str) -> Result<()> {
        if Self::is_protected(id) {
            return Err(Self::refuse(id, "remove the source of base"));
        }
        self.inner.remove_package_source(id)
    }

    async fn install_package(
        &self,
        installer: &dyn PackageInstaller,
        monitor: Option<&dyn ProgressMonitor>,
    ) -> Result<()> {
        let id = &installer.manifest().id;
        if Self::is_protected(id) {
            return Err(Self::refuse(id, "install base"));
        }
        self.inner.install_package(installer, monitor).await
    }

    fn uninstall(&self, id: &str) -> Result<()> {
        if Self::is_protected(id) {
            return Err(Self::refuse(id, "uninstall base"));
        }
        self.inner.uninstall(id)
    }
}
