use std::fmt;
use std::str::FromStr;

use super::VersionNumber;
use crate::error::PackageError;

/// A half-open version interval `[lower, upper)`.
///
/// `lower <= upper` always holds; constructing bounds that would violate it
/// fails with [`PackageError::UnsatisfiableBounds`]. `lower == upper` is
/// representable and contains nothing, but [`combine`](Self::combine) never
/// produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionBounds {
    lower: VersionNumber,
    upper: VersionNumber,
}

impl VersionBounds {
    pub const UNBOUNDED: VersionBounds = VersionBounds {
        lower: VersionNumber::ZERO,
        upper: VersionNumber::INFINITE,
    };

    pub fn new(lower: VersionNumber, upper: VersionNumber) -> Result<Self, PackageError> {
        if lower > upper {
            return Err(PackageError::UnsatisfiableBounds {
                id: String::new(),
                lower: lower.to_string(),
                upper: upper.to_string(),
            });
        }
        Ok(Self { lower, upper })
    }

    /// `[version, version.patch + 1)`: exactly one patch release.
    pub fn exact(version: VersionNumber) -> Self {
        Self {
            lower: version,
            upper: version.next_patch(),
        }
    }

    /// `[version, inf)`.
    pub fn at_least(version: VersionNumber) -> Self {
        Self {
            lower: version,
            upper: VersionNumber::INFINITE,
        }
    }

    /// `[0, version)`: everything strictly older than `version`.
    pub fn below(version: VersionNumber) -> Self {
        Self {
            lower: VersionNumber::ZERO,
            upper: version,
        }
    }

    pub fn lower(&self) -> VersionNumber {
        self.lower
    }

    pub fn upper(&self) -> VersionNumber {
        self.upper
    }

    pub fn is_unbounded(&self) -> bool {
        *self == Self::UNBOUNDED
    }

    pub fn is_empty(&self) -> bool {
        self.lower >= self.upper
    }

    /// Intersection of two bounds. Fails when no version lies in both.
    pub fn combine(&self, other: &VersionBounds) -> Result<Self, PackageError> {
        let lower = self.lower.max(other.lower);
        let upper = self.upper.min(other.upper);
        if lower >= upper {
            return Err(PackageError::UnsatisfiableBounds {
                id: String::new(),
                lower: lower.to_string(),
                upper: upper.to_string(),
            });
        }
        Ok(Self { lower, upper })
    }

    /// `lower <= version < upper`.
    pub fn contains(&self, version: &VersionNumber) -> bool {
        self.lower <= *version && *version < self.upper
    }

    /// Parses a constraint expression such as `>=1.0,<2.0`, `==1.2.3` or `1.4`.
    ///
    /// Clauses are comma separated and intersected. Supported operators:
    /// `>=`, `>`, `<`, `<=`, `==`; a bare version means `>=`; `*` (or an
    /// empty string) is unbounded.
    pub fn parse_constraint(expr: &str) -> Result<Self, PackageError> {
        let mut bounds = Self::UNBOUNDED;
        for clause in expr.split(',').map(str::trim) {
            if clause.is_empty() || clause == "*" {
                continue;
            }
            let clause_bounds = if let Some(rest) = clause.strip_prefix(">=") {
                Self::at_least(VersionNumber::parse(rest)?)
            } else if let Some(rest) = clause.strip_prefix("<=") {
                Self::below(VersionNumber::parse(rest)?.next_patch())
            } else if let Some(rest) = clause.strip_prefix("==") {
                Self::exact(VersionNumber::parse(rest)?)
            } else if let Some(rest) = clause.strip_prefix('>') {
                Self::at_least(VersionNumber::parse(rest)?.next_patch())
            } else if let Some(rest) = clause.strip_prefix('<') {
                Self::below(VersionNumber::parse(rest)?)
            } else if let Some(rest) = clause.strip_prefix('=') {
                Self::exact(VersionNumber::parse(rest)?)
            } else {
                Self::at_least(VersionNumber::parse(clause)?)
            };
            bounds = bounds.combine(&clause_bounds)?;
        }
        Ok(bounds)
    }
}

impl Default for VersionBounds {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

impl fmt::Display for VersionBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            return write!(f, "*");
        }
        if !self.lower.is_infinite() && self.upper == self.lower.next_patch() {
            return write!(f, "=={}", self.lower);
        }
        write!(f, ">={}", self.lower)?;
        if !self.upper.is_infinite() {
            write!(f, ",<{}", self.upper)?;
        }
        Ok(())
    }
}

impl FromStr for VersionBounds {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_constraint(s)
    }
}
