use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::PackageError;

/// A `major.minor.patch` version.
///
/// Ordering is purely numeric and lexicographic over the three components.
/// [`VersionNumber::INFINITE`] is a sentinel that compares above every
/// version that can be parsed; it is used as an open upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VersionNumber {
    major: u32,
    minor: u32,
    patch: u32,
}

impl VersionNumber {
    pub const ZERO: VersionNumber = VersionNumber::new(0, 0, 0);

    pub const INFINITE: VersionNumber = VersionNumber {
        major: u32::MAX,
        minor: u32::MAX,
        patch: u32::MAX,
    };

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> u32 {
        self.patch
    }

    pub fn is_infinite(&self) -> bool {
        *self == Self::INFINITE
    }

    /// The smallest version strictly greater than `self` with the same
    /// major and minor components.
    pub fn next_patch(&self) -> Self {
        if self.is_infinite() {
            return *self;
        }
        Self::new(self.major, self.minor, self.patch.saturating_add(1))
    }

    /// Parses `v1`, `1.2`, `1.2.3`, `1.2.3.4` and `1.2.3-suffix`.
    ///
    /// A fourth build component and any `-suffix` are accepted and dropped.
    pub fn parse(s: &str) -> Result<Self, PackageError> {
        let invalid = || PackageError::InvalidVersion(s.to_string());

        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let numeric = match trimmed.split_once('-') {
            Some((numeric, _suffix)) => numeric,
            None => trimmed,
        };

        let parts: Vec<&str> = numeric.split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return Err(invalid());
        }

        let mut components = [0u32; 3];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            let value: u32 = part.parse().map_err(|_| invalid())?;
            // The maximum value is reserved for the infinite sentinel.
            if value == u32::MAX {
                return Err(invalid());
            }
            if i < 3 {
                components[i] = value;
            }
        }

        Ok(Self::new(components[0], components[1], components[2]))
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "inf")
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

impl FromStr for VersionNumber {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Default for VersionNumber {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Serialize for VersionNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(VersionNumber::parse("v1.2").unwrap(), VersionNumber::new(1, 2, 0));
        assert_eq!(
            VersionNumber::parse("1.2.3-beta").unwrap(),
            VersionNumber::new(1, 2, 3)
        );
        assert_eq!(VersionNumber::parse("2").unwrap(), VersionNumber::new(2, 0, 0));
        assert_eq!(
            VersionNumber::parse("1.2.3.4").unwrap(),
            VersionNumber::new(1, 2, 3)
        );
        assert_eq!(
            VersionNumber::parse("v0.10.7-rc.1").unwrap(),
            VersionNumber::new(0, 10, 7)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "v", "1..2", "1.2.3.4.5", "a.b.c", "1.x", "-beta", "1.2.", "+1"] {
            assert!(VersionNumber::parse(bad).is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn test_parse_rejects_sentinel_component() {
        assert!(VersionNumber::parse("4294967295").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["v1.2", "1.2.3-beta", "2", "10.0.1.99", "0.0.0"] {
            let v = VersionNumber::parse(s).unwrap();
            assert_eq!(VersionNumber::parse(&v.to_string()).unwrap(), v);
        }
    }

    #[test]
    fn test_ordering() {
        let a = VersionNumber::new(1, 2, 3);
        let b = VersionNumber::new(1, 10, 0);
        let c = VersionNumber::new(2, 0, 0);
        assert!(VersionNumber::ZERO < a);
        assert!(a < b);
        assert!(b < c);
        assert!(c < VersionNumber::INFINITE);
        assert_eq!(a.max(c), c);
        assert_eq!(a.min(c), a);
    }

    #[test]
    fn test_next_patch() {
        assert_eq!(
            VersionNumber::new(1, 4, 9).next_patch(),
            VersionNumber::new(1, 4, 10)
        );
        assert_eq!(VersionNumber::INFINITE.next_patch(), VersionNumber::INFINITE);
    }

    #[test]
    fn test_serde_as_string() {
        let v = VersionNumber::new(1, 0, 2);
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"1.0.2\"");
        let back: VersionNumber = serde_json::from_str("\"v1.0.2\"").unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<VersionNumber>("\"banana\"").is_err());
    }
}
