use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PackageError;

/// Persisted description of where a package comes from.
///
/// Stored as `packageSource.json`: `{ "type": <kind>, "data": <kind specific> }`.
/// The `data` payload is opaque to everything except the matching source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SourceDescriptor {
    pub fn new(kind: SourceKind, data: serde_json::Value) -> Self {
        Self {
            kind: kind.to_string(),
            data,
        }
    }

    /// A GitHub releases feed. `api_url` defaults to the public API.
    pub fn github(owner: &str, repo: &str, api_url: Option<&str>) -> Self {
        let mut data = serde_json::json!({ "owner": owner, "repo": repo });
        if let Some(url) = api_url {
            data["api_url"] = serde_json::Value::String(url.to_string());
        }
        Self::new(SourceKind::GitHub, data)
    }

    /// A zip archive on the local disk.
    pub fn zip(path: &std::path::Path) -> Self {
        Self::new(
            SourceKind::Zip,
            serde_json::json!({ "path": path.to_string_lossy() }),
        )
    }

    pub fn source_kind(&self) -> Result<SourceKind, PackageError> {
        self.kind.parse()
    }

    pub fn from_json(id: &str, json: &str) -> Result<Self, PackageError> {
        serde_json::from_str(json).map_err(|e| PackageError::SourceParsing {
            id: id.to_string(),
            message: e.to_string(),
        })
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Source kinds this build knows how to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    GitHub,
    Zip,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::GitHub => write!(f, "github"),
            SourceKind::Zip => write!(f, "zip"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(SourceKind::GitHub),
            "zip" => Ok(SourceKind::Zip),
            _ => Err(PackageError::SourceParsing {
                id: String::new(),
                message: format!("unknown source kind {:?}, expected github or zip", s),
            }),
        }
    }
}
