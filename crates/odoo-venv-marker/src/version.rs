//! Dotted version numbers (e.g. "17.0", "3.10.12").
//!
//! Comparison is component-wise on integers; missing trailing components
//! count as zero, so "16" == "16.0".

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A version made only of dot-separated unsigned integers.
#[derive(Debug, Clone)]
pub struct DottedVersion {
    parts: Vec<u64>,
}

/// Error returned when a string is not a dotted version.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid dotted version '{0}'")]
pub struct VersionError(pub String);

impl DottedVersion {
    /// Build a version from its numeric components.
    pub fn new(parts: Vec<u64>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    /// Major component (first number).
    pub fn major(&self) -> u64 {
        self.parts.first().copied().unwrap_or(0)
    }

    /// The first `n` components, zero-padded when the version is shorter.
    pub fn truncate(&self, n: usize) -> Self {
        let mut parts: Vec<u64> = self.parts.iter().copied().take(n).collect();
        parts.resize(n, 0);
        Self { parts }
    }

    /// `~=` compatible-release check: `self >= other` and both share every
    /// component of `other` except the last one.
    pub fn is_compatible_with(&self, other: &DottedVersion) -> bool {
        if other.parts.len() < 2 || self < other {
            return false;
        }
        let prefix = other.parts.len() - 1;
        self.truncate(prefix) == other.truncate(prefix)
    }

    fn component(&self, i: usize) -> u64 {
        self.parts.get(i).copied().unwrap_or(0)
    }
}

impl FromStr for DottedVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(VersionError(s.to_string()));
        }
        let parts = trimmed
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VersionError(s.to_string()))?;
        Ok(Self { parts })
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DottedVersion {}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            match self.component(i).cmp(&other.component(i)) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        write!(f, "{}", joined.join("."))
    }
}

impl Serialize for DottedVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DottedVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
