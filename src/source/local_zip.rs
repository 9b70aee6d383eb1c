use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{
    PackageInstaller, PackageSource, ProgressMonitor, SourceDescriptor, ensure_not_cancelled,
};
use crate::archive::{extract_zip_blocking, read_zip_manifest_blocking};
use crate::error::PackageError;
use crate::package::PackageManifest;
use crate::runtime::Runtime;
use crate::version::{VersionBounds, VersionNumber};

/// A zip archive on the local disk that carries its own `manifest.json`.
pub struct LocalZipSource {
    id: String,
    path: PathBuf,
    runtime: Arc<dyn Runtime>,
}

impl LocalZipSource {
    pub fn new(id: &str, path: PathBuf, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            id: id.to_string(),
            path,
            runtime,
        }
    }

    async fn read_manifest(&self) -> Result<PackageManifest> {
        let content = read_zip_manifest_blocking(self.runtime.clone(), self.path.clone())
            .await?
            .ok_or_else(|| {
                PackageError::ManifestParsing {
                    id: self.id.clone(),
                    message: format!("{:?} has no manifest.json", self.path),
                }
            })?;
        Ok(PackageManifest::from_json(&self.id, &content, None)?)
    }
}

#[async_trait]
impl PackageSource for LocalZipSource {
    fn descriptor(&self) -> Option<SourceDescriptor> {
        Some(SourceDescriptor::zip(&self.path))
    }

    async fn get_package_manifest(
        &self,
        bounds: &VersionBounds,
        game_version: &VersionNumber,
        monitor: Option<&dyn ProgressMonitor>,
        cancel: &CancellationToken,
    ) -> Result<PackageManifest> {
        ensure_not_cancelled(cancel)?;
        if let Some(monitor) = monitor {
            monitor.request_pending(&self.id);
        }

        let manifest = self
            .read_manifest()
            .await
            .with_context(|| format!("Failed to read package archive of {}", self.id))?;
        if bounds.contains(&manifest.version) && manifest.supports_game(game_version) {
            return Ok(manifest);
        }

        Err(PackageError::VersionNotAvailable {
            id: self.id.clone(),
            bounds: bounds.to_string(),
        }
        .into())
    }

    async fn get_installer(&self, manifest: &PackageManifest) -> Result<Box<dyn PackageInstaller>> {
        Ok(Box::new(ArchiveInstaller {
            manifest: manifest.clone(),
            archive: self.path.clone(),
            runtime: self.runtime.clone(),
        }))
    }
}

/// Extracts an archive that is already on disk.
pub struct ArchiveInstaller {
    manifest: PackageManifest,
    archive: PathBuf,
    runtime: Arc<dyn Runtime>,
}

#[async_trait]
impl PackageInstaller for ArchiveInstaller {
    fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    async fn install(&self, destination: &Path, monitor: Option<&dyn ProgressMonitor>) -> Result<()> {
        let id = &self.manifest.id;
        if let Some(monitor) = monitor {
            monitor.extraction_started(id);
        }
        extract_zip_blocking(
            self.runtime.clone(),
            self.archive.clone(),
            destination.to_path_buf(),
        )
        .await
        .with_context(|| format!("Failed to extract {} from {:?}", id, self.archive))?;
        if let Some(monitor) = monitor {
            monitor.extraction_completed(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::write_zip;
    use crate::runtime::{MockRuntime, RealRuntime};
    use crate::source::AggregateProgress;
    use std::fs;
    use tempfile::tempdir;

    const MANIFEST: &str = r#"{
        "title": "Piper Cub",
        "package_version": "1.2.0",
        "minimum_game_version": "1.20.0",
        "dependencies": [{"name": "fs-base-aircraft", "package_version": ">=0.1"}]
    }"#;

    fn source(path: PathBuf) -> LocalZipSource {
        LocalZipSource::new("piper-cub", path, Arc::new(RealRuntime))
    }

    fn v(s: &str) -> VersionNumber {
        VersionNumber::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_manifest_from_archive() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("cub.zip");
        write_zip(
            &archive,
            &[("piper-cub/manifest.json", MANIFEST), ("piper-cub/layout.json", "{}")],
        );

        let manifest = source(archive)
            .get_package_manifest(
                &VersionBounds::UNBOUNDED,
                &v("1.30"),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(manifest.title, "Piper Cub");
        assert_eq!(manifest.version, v("1.2.0"));
        assert_eq!(manifest.dependencies.len(), 1);
    }

    #[tokio::test]
    async fn test_bounds_and_game_version_are_checked() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("cub.zip");
        write_zip(&archive, &[("manifest.json", MANIFEST)]);
        let source = source(archive);
        let cancel = CancellationToken::new();

        let too_new = VersionBounds::at_least(v("2.0"));
        let err = source
            .get_package_manifest(&too_new, &v("1.30"), None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackageError>(),
            Some(PackageError::VersionNotAvailable { .. })
        ));

        let err = source
            .get_package_manifest(&VersionBounds::UNBOUNDED, &v("1.10"), None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PackageError>(),
            Some(PackageError::VersionNotAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_archive_without_manifest() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("bare.zip");
        write_zip(&archive, &[("layout.json", "{}")]);

        let err = source(archive)
            .get_package_manifest(
                &VersionBounds::UNBOUNDED,
                &v("1.0"),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            PackageError::find(&err),
            Some(PackageError::ManifestParsing { .. })
        ));
    }

    #[tokio::test]
    async fn test_installer_extracts_archive() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("cub.zip");
        write_zip(
            &archive,
            &[("piper-cub/manifest.json", MANIFEST), ("piper-cub/layout.json", "{}")],
        );
        let source = source(archive.clone());
        let manifest = PackageManifest::new("piper-cub", v("1.2.0"));
        let destination = dir.path().join("Community/piper-cub");
        fs::create_dir_all(&destination).unwrap();
        let progress = AggregateProgress::new();

        let installer = source.get_installer(&manifest).await.unwrap();
        installer.install(&destination, Some(&progress)).await.unwrap();

        assert!(destination.join("manifest.json").exists());
        assert!(destination.join("layout.json").exists());
        assert_eq!(progress.snapshot().extractions_completed, 1);
        assert_eq!(source.descriptor(), Some(SourceDescriptor::zip(&archive)));
    }

    #[tokio::test]
    async fn test_manifest_read_on_blocking_pool() {
        let caller = std::thread::current().id();
        let mut runtime = MockRuntime::new();
        runtime.expect_read().returning(move |_| {
            assert_ne!(std::thread::current().id(), caller);
            Err(anyhow::anyhow!("permission denied"))
        });
        let source = LocalZipSource::new(
            "piper-cub",
            PathBuf::from("/downloads/cub.zip"),
            Arc::new(runtime),
        );

        let err = source
            .get_package_manifest(
                &VersionBounds::UNBOUNDED,
                &v("1.30"),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("permission denied"));
    }
}
