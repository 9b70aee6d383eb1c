use std::path::{Path, PathBuf};

use super::{OFFICIAL_DIR, PackageManifest};
use crate::source::SourceDescriptor;

/// One entry of the package database.
///
/// `manifest` is `None` for packages whose source was registered but which
/// were never installed; `source` is `None` for packages with no managed
/// upstream, such as the game's own official content.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledPackage {
    pub id: String,
    /// Relative to the package root.
    pub path: PathBuf,
    pub manifest: Option<PackageManifest>,
    pub source: Option<SourceDescriptor>,
}

impl InstalledPackage {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            manifest: None,
            source: None,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.manifest.is_some()
    }

    pub fn is_official(&self) -> bool {
        is_official_path(&self.path)
    }
}

pub(crate) fn is_official_path(path: &Path) -> bool {
    path.components()
        .next()
        .is_some_and(|c| c.as_os_str() == OFFICIAL_DIR)
}
