use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

use super::{COMMUNITY_DIR, MANIFEST_FILE, OFFICIAL_DIR, SOURCE_FILE};

/// A package directory found under the package root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLocation {
    pub id: String,
    /// Relative to the package root, e.g. `Community/piper-cub`.
    pub relative_path: PathBuf,
    pub has_manifest: bool,
    pub has_source: bool,
}

/// Finds every package directory that holds a manifest or a source
/// descriptor.
///
/// Layout: `<root>/{Official,Community}/<id>/{manifest.json,packageSource.json}`.
/// Official packages are listed first.
#[tracing::instrument(skip(runtime, root))]
pub fn find_package_dirs<R: Runtime + ?Sized>(runtime: &R, root: &Path) -> Result<Vec<PackageLocation>> {
    let mut found = Vec::new();

    for subtree in [OFFICIAL_DIR, COMMUNITY_DIR] {
        let subtree_path = root.join(subtree);
        if !runtime.is_dir(&subtree_path) {
            continue;
        }

        let mut package_dirs = runtime.read_dir(&subtree_path)?;
        package_dirs.sort();

        for package_dir in package_dirs {
            if !runtime.is_dir(&package_dir) {
                continue;
            }
            let Some(id) = package_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let has_manifest = runtime.exists(&package_dir.join(MANIFEST_FILE));
            let has_source = runtime.exists(&package_dir.join(SOURCE_FILE));
            if has_manifest || has_source {
                found.push(PackageLocation {
                    id: id.to_string(),
                    relative_path: Path::new(subtree).join(id),
                    has_manifest,
                    has_source,
                });
            }
        }
    }

    Ok(found)
}
