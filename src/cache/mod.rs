//! On-disk store of downloaded package archives, keyed by `(id, version)`.
//!
//! Layout: `<root>/<package id>/<version>/`. The index is rebuilt from the
//! directory tree on every start, so there is no index file to corrupt.

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::runtime::Runtime;
use crate::version::VersionNumber;

type CacheKey = (String, VersionNumber);

pub struct PackageCache {
    runtime: Arc<dyn Runtime>,
    root: PathBuf,
    entries: Mutex<HashMap<CacheKey, PathBuf>>,
    locks: Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
}

impl PackageCache {
    /// Opens the cache at `root`, indexing every `<id>/<version>` directory
    /// found. Directories whose name is not a version are ignored.
    pub fn open(runtime: Arc<dyn Runtime>, root: PathBuf) -> Result<Self> {
        let mut entries = HashMap::new();

        if runtime.is_dir(&root) {
            for package_dir in runtime.read_dir(&root)? {
                if !runtime.is_dir(&package_dir) {
                    continue;
                }
                let Some(id) = package_dir.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                for version_dir in runtime.read_dir(&package_dir)? {
                    if !runtime.is_dir(&version_dir) {
                        continue;
                    }
                    let name = version_dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    match VersionNumber::parse(&name) {
                        Ok(version) => {
                            let relative = Path::new(id).join(&name);
                            entries.insert((id.to_string(), version), relative);
                        }
                        Err(_) => debug!("Ignoring cache directory {:?}", version_dir),
                    }
                }
            }
        }

        debug!("Indexed {} cache entries under {:?}", entries.len(), root);
        Ok(Self {
            runtime,
            root,
            entries: Mutex::new(entries),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, PathBuf>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn key(id: &str, version: &VersionNumber) -> CacheKey {
        (id.to_string(), *version)
    }

    pub fn contains(&self, id: &str, version: &VersionNumber) -> bool {
        self.entries().contains_key(&Self::key(id, version))
    }

    /// Absolute directory of an existing entry. Fails if the entry is absent;
    /// use [`PackageCache::add_cache_entry`] to create it.
    pub fn get_path(&self, id: &str, version: &VersionNumber) -> Result<PathBuf> {
        self.entries()
            .get(&Self::key(id, version))
            .map(|relative| self.root.join(relative))
            .ok_or_else(|| anyhow!("No cache entry for {} {}", id, version))
    }

    /// Returns the entry directory, creating it if needed.
    pub fn add_cache_entry(&self, id: &str, version: &VersionNumber) -> Result<PathBuf> {
        let key = Self::key(id, version);
        if let Some(relative) = self.entries().get(&key) {
            return Ok(self.root.join(relative));
        }

        let relative = Path::new(id).join(version.to_string());
        let path = self.root.join(&relative);
        self.runtime
            .create_dir_all(&path)
            .with_context(|| format!("Failed to create cache entry for {} {}", id, version))?;

        debug!("Added cache entry {:?}", path);
        self.entries().insert(key, relative);
        Ok(path)
    }

    /// Deletes the entry directory, then every ancestor left empty by that,
    /// stopping below the cache root.
    pub fn remove_cache_entry(&self, id: &str, version: &VersionNumber) -> Result<()> {
        let Some(relative) = self.entries().remove(&Self::key(id, version)) else {
            return Ok(());
        };

        let path = self.root.join(&relative);
        if self.runtime.exists(&path) {
            self.runtime
                .remove_dir_all(&path)
                .with_context(|| format!("Failed to remove cache entry {:?}", path))?;
        }

        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // Fails on the first non-empty ancestor.
            if let Err(e) = self.runtime.remove_dir(dir) {
                debug!("Stopped cache cleanup at {:?}: {}", dir, e);
                break;
            }
            parent = dir.parent();
        }
        Ok(())
    }

    /// Waits for exclusive use of one `(id, version)` entry. Hold the guard
    /// while checking, filling or removing the entry.
    pub async fn lock_entry(&self, id: &str, version: &VersionNumber) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| {
                warn!("Cache lock table was poisoned");
                e.into_inner()
            });
            locks
                .entry(Self::key(id, version))
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
