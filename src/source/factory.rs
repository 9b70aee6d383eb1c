use anyhow::Result;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::github::DEFAULT_API_URL;
use super::{
    GitHubReleaseSource, InstalledSource, LocalZipSource, PackageSource, SourceDescriptor,
    SourceKind, SourceRepository,
};
use crate::cache::PackageCache;
use crate::error::PackageError;
use crate::http::HttpClient;
use crate::package::PackageDatabase;
use crate::runtime::Runtime;

#[derive(Deserialize)]
struct GitHubData {
    owner: String,
    repo: String,
    #[serde(default)]
    api_url: Option<String>,
}

#[derive(Deserialize)]
struct ZipData {
    path: PathBuf,
}

/// Instantiates sources from persisted descriptors.
#[derive(Clone)]
pub struct SourceFactory {
    http: HttpClient,
    cache: Arc<PackageCache>,
    runtime: Arc<dyn Runtime>,
    default_api_url: String,
}

impl SourceFactory {
    pub fn new(http: HttpClient, cache: Arc<PackageCache>, runtime: Arc<dyn Runtime>) -> Self {
        Self {
            http,
            cache,
            runtime,
            default_api_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// API root used for GitHub descriptors that do not name one.
    pub fn with_default_api_url(mut self, api_url: &str) -> Self {
        self.default_api_url = api_url.to_string();
        self
    }

    pub fn create(&self, id: &str, descriptor: &SourceDescriptor) -> Result<Arc<dyn PackageSource>> {
        let kind = descriptor.source_kind().map_err(|e| e.for_package(id))?;

        let source: Arc<dyn PackageSource> = match kind {
            SourceKind::GitHub => {
                let data: GitHubData = parse_data(id, descriptor)?;
                let api_url = data.api_url.as_deref().unwrap_or(&self.default_api_url);
                Arc::new(GitHubReleaseSource::new(
                    id,
                    &data.owner,
                    &data.repo,
                    api_url,
                    self.http.clone(),
                    self.cache.clone(),
                    self.runtime.clone(),
                ))
            }
            SourceKind::Zip => {
                let data: ZipData = parse_data(id, descriptor)?;
                Arc::new(LocalZipSource::new(id, data.path, self.runtime.clone()))
            }
        };
        Ok(source)
    }
}

fn parse_data<T: DeserializeOwned>(id: &str, descriptor: &SourceDescriptor) -> Result<T> {
    serde_json::from_value(descriptor.data.clone()).map_err(|e| {
        PackageError::SourceParsing {
            id: id.to_string(),
            message: format!("invalid {} source data: {}", descriptor.kind, e),
        }
        .into()
    })
}

/// Looks sources up in the package database.
///
/// A remembered descriptor wins; an installed package without one is served
/// by an [`InstalledSource`]; anything else is not available. Each id's
/// source is created once and reused, so its fetched release data is too.
pub struct DatabaseSourceRepository<'a, D: PackageDatabase + ?Sized> {
    database: &'a D,
    factory: SourceFactory,
    sources: Mutex<HashMap<String, Arc<dyn PackageSource>>>,
}

impl<'a, D: PackageDatabase + ?Sized> DatabaseSourceRepository<'a, D> {
    pub fn new(database: &'a D, factory: SourceFactory) -> Self {
        Self {
            database,
            factory,
            sources: Mutex::new(HashMap::new()),
        }
    }

    fn create(&self, id: &str) -> Result<Arc<dyn PackageSource>> {
        let package = self.database.get(id);

        if let Some(descriptor) = package.as_ref().and_then(|p| p.source.as_ref()) {
            return self.factory.create(id, descriptor);
        }
        if let Some(manifest) = package.and_then(|p| p.manifest) {
            return Ok(Arc::new(InstalledSource::new(manifest)));
        }
        Err(PackageError::PackageNotAvailable { id: id.to_string() }.into())
    }
}

impl<D: PackageDatabase + ?Sized> SourceRepository for DatabaseSourceRepository<'_, D> {
    fn get_source(&self, id: &str) -> Result<Arc<dyn PackageSource>> {
        let mut sources = self.sources.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(source) = sources.get(id) {
            return Ok(source.clone());
        }
        let source = self.create(id)?;
        sources.insert(id.to_string(), source.clone());
        Ok(source)
    }
}
