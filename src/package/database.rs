use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::installed::is_official_path;
use super::{
    COMMUNITY_DIR, InstalledPackage, MANIFEST_FILE, PackageManifest, SOURCE_FILE,
    find_package_dirs,
};
use crate::error::PackageError;
use crate::logger::Logger;
use crate::runtime::Runtime;
use crate::source::{PackageInstaller, ProgressMonitor, SourceDescriptor};
use crate::version::VersionBounds;
use crate::{log_debug, log_error, log_info, log_warn};

/// Authoritative record of installed and registered packages.
#[async_trait]
pub trait PackageDatabase: Send + Sync {
    /// Every known package, installed or merely registered.
    fn packages(&self) -> Vec<InstalledPackage>;

    fn get(&self, id: &str) -> Option<InstalledPackage>;

    /// Whether `id` is installed, optionally at a version inside `bounds`.
    fn contains(&self, id: &str, bounds: Option<&VersionBounds>) -> bool;

    /// Fails with `PackageError::PackageNotInstalled` if `id` has no manifest.
    fn installed_manifest(&self, id: &str) -> Result<PackageManifest>;

    fn add_package_source(&self, id: &str, source: SourceDescriptor) -> Result<()>;

    fn remove_package_source(&self, id: &str) -> Result<()>;

    /// Installs (or replaces) the installer's package. On failure, whatever
    /// was written is removed again before the error is returned.
    async fn install_package(
        &self,
        installer: &dyn PackageInstaller,
        monitor: Option<&dyn ProgressMonitor>,
    ) -> Result<()>;

    /// Removes an installed package but keeps its remembered source.
    fn uninstall(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct DatabaseState {
    packages: HashMap<String, InstalledPackage>,
    /// Packages whose manifest could not be read, with the reason.
    errored: HashMap<String, String>,
}

/// [`PackageDatabase`] stored as per-package directories under a root.
///
/// State is loaded once in [`DiskPackageDatabase::open`] and every mutation
/// is written through to disk before it returns.
pub struct DiskPackageDatabase<'a, R: Runtime> {
    runtime: &'a R,
    root: PathBuf,
    logger: Arc<dyn Logger>,
    state: RwLock<DatabaseState>,
}

impl<'a, R: Runtime> DiskPackageDatabase<'a, R> {
    /// Scans `root` for manifests and source descriptors.
    ///
    /// A package whose manifest fails to parse is logged, recorded in
    /// [`DiskPackageDatabase::errored_packages`] and left out; it does not
    /// stop the scan.
    pub fn open(runtime: &'a R, root: PathBuf, logger: Arc<dyn Logger>) -> Result<Self> {
        let mut state = DatabaseState::default();

        let locations = find_package_dirs(runtime, &root)
            .with_context(|| format!("Failed to scan package root {:?}", root))?;

        for location in locations {
            if state.packages.contains_key(&location.id) {
                log_warn!(
                    logger,
                    "Ignoring duplicate package {} at {:?}",
                    location.id,
                    location.relative_path
                );
                continue;
            }

            let dir = root.join(&location.relative_path);
            let mut package = InstalledPackage::new(&location.id, location.relative_path.clone());

            if location.has_manifest {
                match load_manifest(runtime, &location.id, &dir.join(MANIFEST_FILE)) {
                    Ok(manifest) => package.manifest = Some(manifest),
                    Err(e) => {
                        log_warn!(logger, "Skipping package {}: {:#}", location.id, e);
                        state.errored.insert(location.id.clone(), format!("{:#}", e));
                        continue;
                    }
                }
            }

            if location.has_source {
                match load_source(runtime, &location.id, &dir.join(SOURCE_FILE)) {
                    Ok(source) => package.source = Some(source),
                    Err(e) => {
                        log_warn!(logger, "Ignoring source of {}: {:#}", location.id, e);
                    }
                }
            }

            if package.manifest.is_some() || package.source.is_some() {
                state.packages.insert(location.id.clone(), package);
            }
        }

        log_debug!(
            logger,
            "Loaded {} packages from {:?} ({} errored)",
            state.packages.len(),
            root,
            state.errored.len()
        );

        Ok(Self {
            runtime,
            root,
            logger,
            state: RwLock::new(state),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute directory of `id`, whether or not it exists yet.
    pub fn package_path(&self, id: &str) -> PathBuf {
        self.root.join(self.relative_path(id))
    }

    /// `(id, reason)` for every manifest that failed to load, sorted by id.
    pub fn errored_packages(&self) -> Vec<(String, String)> {
        let mut errored: Vec<_> = self
            .read_state()
            .errored
            .iter()
            .map(|(id, reason)| (id.clone(), reason.clone()))
            .collect();
        errored.sort();
        errored
    }

    fn read_state(&self) -> RwLockReadGuard<'_, DatabaseState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, DatabaseState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn relative_path(&self, id: &str) -> PathBuf {
        self.read_state()
            .packages
            .get(id)
            .map(|p| p.path.clone())
            .unwrap_or_else(|| Path::new(COMMUNITY_DIR).join(id))
    }

    /// Deletes everything in `dir` except the source descriptor.
    fn clear_package_dir(&self, dir: &Path) -> Result<()> {
        if !self.runtime.exists(dir) {
            return Ok(());
        }
        for entry in self.runtime.read_dir(dir)? {
            if entry.file_name().is_some_and(|n| n == SOURCE_FILE) {
                continue;
            }
            if self.runtime.is_dir(&entry) {
                self.runtime.remove_dir_all(&entry)?;
            } else {
                self.runtime.remove_file(&entry)?;
            }
        }
        Ok(())
    }

    /// Removes the installed files of `id` and forgets its manifest.
    fn remove_installed_files(&self, id: &str, dir: &Path) -> Result<()> {
        self.clear_package_dir(dir)
            .with_context(|| format!("Failed to remove files of {}", id))?;

        // Still holds packageSource.json when a source is remembered.
        if let Err(e) = self.runtime.remove_dir(dir) {
            log_debug!(self.logger, "Keeping directory {:?}: {:#}", dir, e);
        }

        let mut state = self.write_state();
        let forget = match state.packages.get_mut(id) {
            Some(package) => {
                package.manifest = None;
                package.source.is_none()
            }
            None => false,
        };
        if forget {
            state.packages.remove(id);
        }
        state.errored.remove(id);
        Ok(())
    }

    fn write_manifest_if_missing(&self, dir: &Path, manifest: &PackageManifest) -> Result<()> {
        let manifest_path = dir.join(MANIFEST_FILE);
        if self.runtime.exists(&manifest_path) {
            return Ok(());
        }
        let content = manifest.to_json()?;
        self.runtime
            .write(&manifest_path, content.as_bytes())
            .with_context(|| format!("Failed to write manifest of {}", manifest.id))
    }
}

#[async_trait]
impl<'a, R: Runtime> PackageDatabase for DiskPackageDatabase<'a, R> {
    fn packages(&self) -> Vec<InstalledPackage> {
        let mut packages: Vec<_> = self.read_state().packages.values().cloned().collect();
        packages.sort_by(|a, b| a.id.cmp(&b.id));
        packages
    }

    fn get(&self, id: &str) -> Option<InstalledPackage> {
        self.read_state().packages.get(id).cloned()
    }

    fn contains(&self, id: &str, bounds: Option<&VersionBounds>) -> bool {
        let state = self.read_state();
        let Some(manifest) = state.packages.get(id).and_then(|p| p.manifest.as_ref()) else {
            return false;
        };
        bounds.is_none_or(|b| b.contains(&manifest.version))
    }

    fn installed_manifest(&self, id: &str) -> Result<PackageManifest> {
        self.read_state()
            .packages
            .get(id)
            .and_then(|p| p.manifest.clone())
            .ok_or_else(|| PackageError::PackageNotInstalled { id: id.to_string() }.into())
    }

    fn add_package_source(&self, id: &str, source: SourceDescriptor) -> Result<()> {
        let relative = self.relative_path(id);
        let dir = self.root.join(&relative);
        if !self.runtime.exists(&dir) {
            self.runtime.create_dir_all(&dir)?;
        }

        let content = source.to_json()?;
        self.runtime
            .write(&dir.join(SOURCE_FILE), content.as_bytes())
            .with_context(|| format!("Failed to save source of {}", id))?;

        log_info!(self.logger, "Registered {} source for {}", source.kind, id);

        let mut state = self.write_state();
        state
            .packages
            .entry(id.to_string())
            .or_insert_with(|| InstalledPackage::new(id, relative))
            .source = Some(source);
        Ok(())
    }

    fn remove_package_source(&self, id: &str) -> Result<()> {
        let Some(package) = self.get(id) else {
            return Ok(());
        };

        let dir = self.root.join(&package.path);
        let source_path = dir.join(SOURCE_FILE);
        if self.runtime.exists(&source_path) {
            self.runtime
                .remove_file(&source_path)
                .with_context(|| format!("Failed to remove source of {}", id))?;
        }

        if !package.is_installed() {
            if let Err(e) = self.runtime.remove_dir(&dir) {
                log_debug!(self.logger, "Keeping directory {:?}: {:#}", dir, e);
            }
        }

        let mut state = self.write_state();
        let forget = match state.packages.get_mut(id) {
            Some(entry) => {
                entry.source = None;
                entry.manifest.is_none()
            }
            None => false,
        };
        if forget {
            state.packages.remove(id);
        }
        log_info!(self.logger, "Forgot source of {}", id);
        Ok(())
    }

    async fn install_package(
        &self,
        installer: &dyn PackageInstaller,
        monitor: Option<&dyn ProgressMonitor>,
    ) -> Result<()> {
        let manifest = installer.manifest().clone();
        let id = manifest.id.clone();
        let relative = self.relative_path(&id);
        if is_official_path(&relative) {
            return Err(PackageError::Unsupported {
                id,
                operation: "install over official".to_string(),
            }
            .into());
        }
        let dir = self.root.join(&relative);

        // An install always replaces, never merges.
        if self.runtime.exists(&dir.join(MANIFEST_FILE)) {
            log_info!(self.logger, "Replacing installed {}", id);
            self.remove_installed_files(&id, &dir)?;
        }

        self.runtime.create_dir_all(&dir)?;
        log_info!(
            self.logger,
            "Installing {} {} into {:?}",
            id,
            manifest.version,
            dir
        );

        let result = match installer.install(&dir, monitor).await {
            Ok(()) => self.write_manifest_if_missing(&dir, &manifest),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            log_error!(self.logger, "Installing {} failed, rolling back: {:#}", id, e);
            if let Err(rollback) = self.remove_installed_files(&id, &dir) {
                log_warn!(self.logger, "Rollback of {} incomplete: {:#}", id, rollback);
            }
            return Err(e.context(format!("Failed to install {} {}", id, manifest.version)));
        }

        let mut state = self.write_state();
        let package = state
            .packages
            .entry(id.clone())
            .or_insert_with(|| InstalledPackage::new(&id, relative));
        package.manifest = Some(manifest);
        state.errored.remove(&id);
        Ok(())
    }

    fn uninstall(&self, id: &str) -> Result<()> {
        let package = self
            .get(id)
            .filter(InstalledPackage::is_installed)
            .ok_or_else(|| PackageError::PackageNotInstalled { id: id.to_string() })?;
        if package.is_official() {
            return Err(PackageError::Unsupported {
                id: id.to_string(),
                operation: "uninstall official".to_string(),
            }
            .into());
        }

        let dir = self.root.join(&package.path);
        self.remove_installed_files(id, &dir)?;
        log_info!(self.logger, "Uninstalled {}", id);
        Ok(())
    }
}

fn load_manifest<R: Runtime>(runtime: &R, id: &str, path: &Path) -> Result<PackageManifest> {
    let content = runtime.read_to_string(path)?;
    Ok(PackageManifest::from_json(id, &content, None)?)
}

fn load_source<R: Runtime>(runtime: &R, id: &str, path: &Path) -> Result<SourceDescriptor> {
    let content = runtime.read_to_string(path)?;
    Ok(SourceDescriptor::from_json(id, &content)?)
}
