//! Source repository decorators.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{PackageInstaller, PackageSource, ProgressMonitor, SourceDescriptor, SourceRepository};
use crate::error::PackageError;
use crate::package::PackageManifest;
use crate::version::{VersionBounds, VersionNumber};

/// Ids reserved for content shipped with the game itself.
pub const BASE_PACKAGE_PREFIX: &str = "fs-base";

/// Stand-in source for a base-game package. Whatever bound is asked for,
/// its lowest version is offered, with no dependencies and nothing to
/// install.
pub struct BaseGameSource {
    id: String,
}

impl BaseGameSource {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

#[async_trait]
impl PackageSource for BaseGameSource {
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
        if bounds.is_empty() {
            return Err(PackageError::VersionNotAvailable {
                id: self.id.clone(),
                bounds: bounds.to_string(),
            }
            .into());
        }
        Ok(PackageManifest::new(&self.id, bounds.lower()))
    }

    async fn get_installer(&self, manifest: &PackageManifest) -> Result<Box<dyn PackageInstaller>> {
        Err(PackageError::Unsupported {
            id: manifest.id.clone(),
            operation: "install base".to_string(),
        }
        .into())
    }
}

/// Answers ids under [`BASE_PACKAGE_PREFIX`] with a [`BaseGameSource`] and
/// forwards everything else.
pub struct HiddenBaseSources<S> {
    inner: S,
}

impl<S: SourceRepository> HiddenBaseSources<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: SourceRepository> SourceRepository for HiddenBaseSources<S> {
    fn get_source(&self, id: &str) -> Result<Arc<dyn PackageSource>> {
        if id.starts_with(BASE_PACKAGE_PREFIX) {
            return Ok(Arc::new(BaseGameSource::new(id)));
        }
        self.inner.get_source(id)
    }
}

/// Sources that take precedence over the wrapped repository for this run
/// only. Nothing registered here is written to disk.
pub struct EphemeralSources<S> {
    inner: S,
    sources: HashMap<String, Arc<dyn PackageSource>>,
}

impl<S: SourceRepository> EphemeralSources<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            sources: HashMap::new(),
        }
    }

    pub fn with_source(mut self, id: &str, source: Arc<dyn PackageSource>) -> Self {
        self.sources.insert(id.to_string(), source);
        self
    }
}

impl<S: SourceRepository> SourceRepository for EphemeralSources<S> {
    fn get_source(&self, id: &str) -> Result<Arc<dyn PackageSource>> {
        match self.sources.get(id) {
            Some(source) => Ok(source.clone()),
            None => self.inner.get_source(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InstalledSource;

    struct NoSources;

    impl SourceRepository for NoSources {
        fn get_source(&self, id: &str) -> Result<Arc<dyn PackageSource>> {
            Err(PackageError::PackageNotAvailable { id: id.to_string() }.into())
        }
    }

    fn v(s: &str) -> VersionNumber {
        VersionNumber::parse(s).unwrap()
    }

    fn not_available(result: Result<Arc<dyn PackageSource>>) -> bool {
        matches!(
            result.err().as_ref().and_then(|e| e.downcast_ref::<PackageError>()),
            Some(PackageError::PackageNotAvailable { .. })
        )
    }

    #[tokio::test]
    async fn test_base_packages_always_resolve() {
        let sources = HiddenBaseSources::new(NoSources);
        let source = sources.get_source("fs-base-aircraft").unwrap();
        let bounds = VersionBounds::new(v("0.1.4"), v("1.0")).unwrap();

        let manifest = source
            .get_package_manifest(&bounds, &v("1.0"), None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.id, "fs-base-aircraft");
        assert!(bounds.contains(&manifest.version));
        assert!(manifest.dependencies.is_empty());
        assert!(source.get_installer(&manifest).await.is_err());
        assert!(not_available(sources.get_source("piper-cub")));
    }

    #[tokio::test]
    async fn test_base_source_rejects_empty_bounds() {
        let source = BaseGameSource::new("fs-base");
        let empty = VersionBounds::new(v("1.0"), v("1.0")).unwrap();
        let result = source
            .get_package_manifest(&empty, &v("1.0"), None, &CancellationToken::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ephemeral_source_takes_precedence() {
        let once: Arc<dyn PackageSource> =
            Arc::new(InstalledSource::new(PackageManifest::new("piper-cub", v("1.0"))));
        let sources = EphemeralSources::new(NoSources).with_source("piper-cub", once);

        let source = sources.get_source("piper-cub").unwrap();
        let manifest = source
            .get_package_manifest(
                &VersionBounds::UNBOUNDED,
                &v("1.0"),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(manifest.version, v("1.0"));
        assert!(not_available(sources.get_source("navdata")));
    }
}
