//! Installed packages and their on-disk database.
//!
//! Layout of the package root:
//!
//! ```text
//! <root>/Official/<id>/manifest.json
//! <root>/Community/<id>/manifest.json
//! <root>/Community/<id>/packageSource.json
//! ```

mod database;
mod discovery;
mod installed;
mod manifest;
mod protected;

pub use database::{DiskPackageDatabase, PackageDatabase};
pub use discovery::{PackageLocation, find_package_dirs};
pub use installed::InstalledPackage;
pub use manifest::{PackageDependency, PackageManifest};
pub use protected::ProtectedDatabase;

pub const OFFICIAL_DIR: &str = "Official";
pub const COMMUNITY_DIR: &str = "Community";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SOURCE_FILE: &str = "packageSource.json";
