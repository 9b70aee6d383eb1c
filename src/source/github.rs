//! GitHub releases as a package source.
//!
//! Every non-draft, non-prerelease release whose tag parses as a version is
//! a candidate. A release may attach a `manifest.json` asset; otherwise a
//! dependency-free manifest is derived from the tag. The package payload is
//! the release's first `.zip` asset.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::{
    PackageInstaller, PackageSource, ProgressMonitor, SourceDescriptor, ensure_not_cancelled,
};
use crate::archive::extract_zip_blocking;
use crate::cache::PackageCache;
use crate::error::PackageError;
use crate::http::HttpClient;
use crate::package::{MANIFEST_FILE, PackageManifest};
use crate::runtime::Runtime;
use crate::version::{VersionBounds, VersionNumber};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// File name of the downloaded archive inside a cache entry.
const ARCHIVE_FILE: &str = "package.zip";

/// GitHub API response types (internal).
mod api {
    use serde::Deserialize;

    #[derive(Deserialize, Debug, Clone)]
    pub struct Release {
        pub tag_name: String,
        #[serde(default)]
        pub draft: bool,
        #[serde(default)]
        pub prerelease: bool,
        #[serde(default)]
        pub assets: Vec<Asset>,
    }

    #[derive(Deserialize, Debug, Clone)]
    pub struct Asset {
        pub name: String,
        #[serde(default)]
        pub size: u64,
        pub browser_download_url: String,
    }
}

pub struct GitHubReleaseSource {
    id: String,
    owner: String,
    repo: String,
    api_url: String,
    http: HttpClient,
    cache: Arc<PackageCache>,
    runtime: Arc<dyn Runtime>,
    releases: OnceCell<Vec<api::Release>>,
    manifests: Mutex<HashMap<VersionNumber, Option<PackageManifest>>>,
}

impl GitHubReleaseSource {
    pub fn new(
        id: &str,
        owner: &str,
        repo: &str,
        api_url: &str,
        http: HttpClient,
        cache: Arc<PackageCache>,
        runtime: Arc<dyn Runtime>,
    ) -> Self {
        Self {
            id: id.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            http,
            cache,
            runtime,
            releases: OnceCell::new(),
            manifests: Mutex::new(HashMap::new()),
        }
    }

    /// Releases in API order (newest first), fetched once per source.
    async fn releases(&self) -> Result<&[api::Release]> {
        let releases = self
            .releases
            .get_or_try_init(|| async {
                let url = format!(
                    "{}/repos/{}/{}/releases?per_page=100",
                    self.api_url, self.owner, self.repo
                );
                debug!("Fetching releases of {} from {}...", self.id, url);
                self.http
                    .get_json::<Vec<api::Release>>(&url)
                    .await
                    .with_context(|| format!("Failed to list releases of {}/{}", self.owner, self.repo))
            })
            .await?;
        Ok(releases.as_slice())
    }

    /// The manifest a release offers, or `None` if its manifest asset is
    /// unusable. Results are memoized per tag version.
    async fn release_manifest(
        &self,
        release: &api::Release,
        tag_version: VersionNumber,
    ) -> Result<Option<PackageManifest>> {
        let known = self.lock_manifests().get(&tag_version).cloned();
        if let Some(known) = known {
            return Ok(known);
        }

        let manifest = match release.assets.iter().find(|a| a.name == MANIFEST_FILE) {
            Some(asset) => {
                let content = self.http.get_text(&asset.browser_download_url).await?;
                match PackageManifest::from_json(&self.id, &content, Some(tag_version)) {
                    Ok(manifest) => Some(manifest),
                    Err(e) => {
                        warn!("Ignoring release {} of {}: {}", release.tag_name, self.id, e);
                        None
                    }
                }
            }
            None => Some(PackageManifest::new(&self.id, tag_version)),
        };

        self.lock_manifests().insert(tag_version, manifest.clone());
        Ok(manifest)
    }

    fn lock_manifests(&self) -> MutexGuard<'_, HashMap<VersionNumber, Option<PackageManifest>>> {
        self.manifests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn offered(release: &api::Release) -> Option<VersionNumber> {
        if release.draft || release.prerelease {
            return None;
        }
        VersionNumber::parse(&release.tag_name).ok()
    }
}

#[async_trait]
impl PackageSource for GitHubReleaseSource {
    fn descriptor(&self) -> Option<SourceDescriptor> {
        let api_url = (self.api_url != DEFAULT_API_URL).then_some(self.api_url.as_str());
        Some(SourceDescriptor::github(&self.owner, &self.repo, api_url))
    }

    async fn get_package_manifest(
        &self,
        bounds: &VersionBounds,
        game_version: &VersionNumber,
        monitor: Option<&dyn ProgressMonitor>,
        cancel: &CancellationToken,
    ) -> Result<PackageManifest> {
        if let Some(monitor) = monitor {
            monitor.request_pending(&self.id);
        }

        let releases = tokio::select! {
            _ = cancel.cancelled() => return Err(PackageError::Cancelled.into()),
            releases = self.releases() => releases?,
        };

        for release in releases {
            ensure_not_cancelled(cancel)?;
            let Some(tag_version) = Self::offered(release) else {
                debug!("Skipping release {} of {}", release.tag_name, self.id);
                continue;
            };
            let Some(manifest) = self.release_manifest(release, tag_version).await? else {
                continue;
            };
            if bounds.contains(&manifest.version) && manifest.supports_game(game_version) {
                debug!("{} {} satisfies {}", self.id, manifest.version, bounds);
                return Ok(manifest);
            }
        }

        Err(PackageError::VersionNotAvailable {
            id: self.id.clone(),
            bounds: bounds.to_string(),
        }
        .into())
    }

    async fn get_installer(&self, manifest: &PackageManifest) -> Result<Box<dyn PackageInstaller>> {
        let releases = self.releases().await?;
        let release = releases
            .iter()
            .find(|r| Self::offered(r) == Some(manifest.source_version))
            .ok_or_else(|| {
                anyhow!(
                    "{} has no release for version {}",
                    self.id,
                    manifest.source_version
                )
            })?;
        let asset = release
            .assets
            .iter()
            .find(|a| a.name.to_lowercase().ends_with(".zip"))
            .ok_or_else(|| anyhow!("Release {} of {} has no zip asset", release.tag_name, self.id))?;

        Ok(Box::new(GitHubInstaller {
            manifest: manifest.clone(),
            url: asset.browser_download_url.clone(),
            size: (asset.size > 0).then_some(asset.size),
            http: self.http.clone(),
            cache: self.cache.clone(),
            runtime: self.runtime.clone(),
        }))
    }
}

/// Downloads a release archive through the package cache and extracts it.
pub struct GitHubInstaller {
    manifest: PackageManifest,
    url: String,
    size: Option<u64>,
    http: HttpClient,
    cache: Arc<PackageCache>,
    runtime: Arc<dyn Runtime>,
}

impl GitHubInstaller {
    /// Path of the cached archive, downloading it first if needed.
    async fn cached_archive(&self, monitor: Option<&dyn ProgressMonitor>) -> Result<PathBuf> {
        let id = &self.manifest.id;
        let version = &self.manifest.source_version;
        let _guard = self.cache.lock_entry(id, version).await;

        if self.cache.contains(id, version) {
            let archive = self.cache.get_path(id, version)?.join(ARCHIVE_FILE);
            if self.runtime.exists(&archive) {
                debug!("Using cached archive {:?}", archive);
                return Ok(archive);
            }
        }

        let archive = self.cache.add_cache_entry(id, version)?.join(ARCHIVE_FILE);
        if let Some(monitor) = monitor {
            monitor.download_started(id, self.size);
        }

        let runtime = &self.runtime;
        let result = self
            .http
            .download_file(
                &self.url,
                || runtime.create_file(&archive),
                |bytes| {
                    if let Some(monitor) = monitor {
                        monitor.download_progress(id, bytes);
                    }
                },
            )
            .await;

        if let Err(e) = result {
            if let Err(cleanup) = self.cache.remove_cache_entry(id, version) {
                warn!("Failed to drop partial download of {}: {}", id, cleanup);
            }
            return Err(e.context(format!("Failed to download {} {}", id, version)));
        }
        Ok(archive)
    }
}

#[async_trait]
impl PackageInstaller for GitHubInstaller {
    fn manifest(&self) -> &PackageManifest {
        &self.manifest
    }

    async fn install(&self, destination: &Path, monitor: Option<&dyn ProgressMonitor>) -> Result<()> {
        let archive = self.cached_archive(monitor).await?;

        if let Some(monitor) = monitor {
            monitor.extraction_started(&self.manifest.id);
        }
        extract_zip_blocking(self.runtime.clone(), archive, destination.to_path_buf())
            .await
            .with_context(|| format!("Failed to extract {}", self.manifest.id))?;
        if let Some(monitor) = monitor {
            monitor.extraction_completed(&self.manifest.id);
        }
        Ok(())
    }
}
