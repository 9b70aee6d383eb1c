//! Domain errors for package resolution and management.
//!
//! These travel inside `anyhow::Error`; callers that need to react to a
//! specific condition classify it with `downcast_ref::<PackageError>()`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageError {
    /// No source is known for this package id.
    #[error("Package {id} is not available from any known source")]
    PackageNotAvailable { id: String },

    /// A source exists, but offers no version inside the requested bound.
    #[error("No version of {id} satisfies {bounds}")]
    VersionNotAvailable { id: String, bounds: String },

    /// Two constraints have an empty intersection.
    #[error("Unsatisfiable version bounds for {id}: lower {lower} is above upper {upper}")]
    UnsatisfiableBounds {
        id: String,
        lower: String,
        upper: String,
    },

    #[error("Invalid version string: {0:?}")]
    InvalidVersion(String),

    #[error("Failed to parse manifest of {id}: {message}")]
    ManifestParsing { id: String, message: String },

    #[error("Failed to parse package source of {id}: {message}")]
    SourceParsing { id: String, message: String },

    #[error("Package {id} is not installed")]
    PackageNotInstalled { id: String },

    #[error("Cannot {operation} package {id}")]
    Unsupported { id: String, operation: String },

    /// A manifest was assigned to a node whose bound it does not satisfy.
    /// Callers are expected to validate through the source first, so this
    /// indicates a bug rather than a recoverable condition.
    #[error("Manifest {id} {version} does not satisfy the node bound {bounds}")]
    InvalidActualization {
        id: String,
        version: String,
        bounds: String,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

impl PackageError {
    /// Attaches a package id to an error raised by code that does not know
    /// which package it was working for (bound combination, source kind
    /// parsing). Errors that already carry an id are returned unchanged.
    pub fn for_package(self, package_id: &str) -> Self {
        match self {
            PackageError::UnsatisfiableBounds { id, lower, upper } if id.is_empty() => {
                PackageError::UnsatisfiableBounds {
                    id: package_id.to_string(),
                    lower,
                    upper,
                }
            }
            PackageError::SourceParsing { id, message } if id.is_empty() => {
                PackageError::SourceParsing {
                    id: package_id.to_string(),
                    message,
                }
            }
            other => other,
        }
    }

    /// Finds a `PackageError` anywhere in an anyhow error chain.
    pub fn find(err: &anyhow::Error) -> Option<&PackageError> {
        err.chain().find_map(|cause| cause.downcast_ref::<PackageError>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_for_package_fills_missing_id() {
        let err = PackageError::UnsatisfiableBounds {
            id: String::new(),
            lower: "2.0.0".into(),
            upper: "1.0.1".into(),
        };
        assert_eq!(
            err.for_package("C"),
            PackageError::UnsatisfiableBounds {
                id: "C".into(),
                lower: "2.0.0".into(),
                upper: "1.0.1".into(),
            }
        );
    }

    #[test]
    fn test_for_package_keeps_existing_id() {
        let err = PackageError::UnsatisfiableBounds {
            id: "A".into(),
            lower: "2.0.0".into(),
            upper: "1.0.1".into(),
        };
        match err.for_package("C") {
            PackageError::UnsatisfiableBounds { id, .. } => assert_eq!(id, "A"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_find_through_context() {
        let err = Err::<(), _>(PackageError::PackageNotAvailable { id: "x".into() })
            .context("while resolving")
            .unwrap_err();
        assert_eq!(
            PackageError::find(&err),
            Some(&PackageError::PackageNotAvailable { id: "x".into() })
        );
    }

    #[test]
    fn test_messages_name_the_package() {
        let err = PackageError::VersionNotAvailable {
            id: "liveries".into(),
            bounds: ">=1.0.0,<2.0.0".into(),
        };
        assert_eq!(
            err.to_string(),
            "No version of liveries satisfies >=1.0.0,<2.0.0"
        );
    }
}
