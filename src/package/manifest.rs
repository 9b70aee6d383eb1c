use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PackageError;
use crate::version::{VersionBounds, VersionNumber};

/// A requirement edge: package `id` within `bounds`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageDependency {
    pub id: String,
    pub bounds: VersionBounds,
}

impl PackageDependency {
    pub fn new(id: impl Into<String>, bounds: VersionBounds) -> Self {
        Self {
            id: id.into(),
            bounds,
        }
    }

    /// Parses `id` or `id@constraint` (e.g. `navdata@>=2.0,<3.0`).
    pub fn parse(spec: &str) -> Result<Self, PackageError> {
        match spec.split_once('@') {
            Some((id, constraint)) => Ok(Self::new(
                id.trim(),
                VersionBounds::parse_constraint(constraint)?,
            )),
            None => Ok(Self::new(spec.trim(), VersionBounds::UNBOUNDED)),
        }
    }
}

impl fmt::Display for PackageDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bounds.is_unbounded() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{}@{}", self.id, self.bounds)
        }
    }
}

/// Immutable description of one version of a package.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageManifest {
    pub id: String,
    pub title: String,
    pub creator: Option<String>,
    /// Version declared by the package itself.
    pub version: VersionNumber,
    pub minimum_game_version: VersionNumber,
    /// Version under which the source publishes this package. Usually equal
    /// to `version`, but a release feed may number its releases differently.
    pub source_version: VersionNumber,
    pub content_type: String,
    pub total_package_size: Option<u64>,
    pub dependencies: Vec<PackageDependency>,
}

impl PackageManifest {
    pub fn new(id: impl Into<String>, version: VersionNumber) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            creator: None,
            version,
            minimum_game_version: VersionNumber::ZERO,
            source_version: version,
            content_type: String::new(),
            total_package_size: None,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, id: impl Into<String>, bounds: VersionBounds) -> Self {
        let id = id.into();
        self.dependencies.retain(|d| d.id != id);
        self.dependencies.push(PackageDependency::new(id, bounds));
        self
    }

    /// The bound this manifest declares for dependency `id`: every entry
    /// naming `id` intersected, `None` when there is no such entry.
    pub fn dependency_bounds(&self, id: &str) -> Result<Option<VersionBounds>, PackageError> {
        let mut entries = self.dependencies.iter().filter(|d| d.id == id);
        let Some(first) = entries.next() else {
            return Ok(None);
        };
        entries
            .try_fold(first.bounds, |acc, d| acc.combine(&d.bounds))
            .map(Some)
            .map_err(|e| e.for_package(id))
    }

    /// Whether this manifest runs on `game_version`.
    pub fn supports_game(&self, game_version: &VersionNumber) -> bool {
        self.minimum_game_version <= *game_version
    }

    /// Parses the game's `manifest.json` format.
    ///
    /// `external_version` is the version known from outside the file (for
    /// example a release tag). It is used when the file lacks
    /// `package_version`, and always becomes the source version.
    pub fn from_json(
        id: &str,
        json: &str,
        external_version: Option<VersionNumber>,
    ) -> Result<Self, PackageError> {
        let parse_error = |message: String| PackageError::ManifestParsing {
            id: id.to_string(),
            message,
        };

        let file: ManifestFile =
            serde_json::from_str(json).map_err(|e| parse_error(e.to_string()))?;

        let version = match (&file.package_version, external_version) {
            (Some(v), _) => VersionNumber::parse(v).map_err(|e| parse_error(e.to_string()))?,
            (None, Some(external)) => external,
            (None, None) => return Err(parse_error("missing package_version".to_string())),
        };

        let minimum_game_version = match &file.minimum_game_version {
            Some(v) => VersionNumber::parse(v).map_err(|e| parse_error(e.to_string()))?,
            None => VersionNumber::ZERO,
        };

        let mut dependencies = Vec::with_capacity(file.dependencies.len());
        for entry in &file.dependencies {
            let bounds = match &entry.package_version {
                Some(constraint) => VersionBounds::parse_constraint(constraint).map_err(|e| {
                    parse_error(format!("dependency {}: {}", entry.name, e))
                })?,
                None => VersionBounds::UNBOUNDED,
            };
            dependencies.push(PackageDependency::new(entry.name.clone(), bounds));
        }

        Ok(Self {
            id: id.to_string(),
            title: file.title.unwrap_or_else(|| id.to_string()),
            creator: file.creator,
            version,
            minimum_game_version,
            source_version: external_version.unwrap_or(version),
            content_type: file.content_type.unwrap_or_default(),
            total_package_size: file.total_package_size.as_ref().and_then(parse_size),
            dependencies,
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let file = ManifestFile {
            creator: self.creator.clone(),
            title: Some(self.title.clone()),
            minimum_game_version: Some(self.minimum_game_version.to_string()),
            package_version: Some(self.version.to_string()),
            total_package_size: self.total_package_size.map(|s| format!("{:020}", s).into()),
            content_type: Some(self.content_type.clone()),
            dependencies: self
                .dependencies
                .iter()
                .map(|d| DependencyEntry {
                    name: d.id.clone(),
                    package_version: Some(d.bounds.to_string()),
                })
                .collect(),
        };
        serde_json::to_string_pretty(&file)
    }
}

/// On-disk shape of `manifest.json`.
#[derive(Serialize, Deserialize, Debug, Default)]
struct ManifestFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    minimum_game_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    package_version: Option<String>,
    /// Written by the game's tooling as a zero padded string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_package_size: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
    #[serde(default)]
    dependencies: Vec<DependencyEntry>,
}

#[derive(Serialize, Deserialize, Debug)]
struct DependencyEntry {
    name: String,
    #[serde(default)]
    package_version: Option<String>,
}

fn parse_size(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
