//! Identifiers shared by events and commands.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Compound identifier of one aggregate instance.
///
/// An aggregate is addressed by its type (e.g. `"order"`) plus an instance
/// id. Both halves are plain strings so the kernel makes no assumption about
/// how callers mint ids (UUIDs, natural keys, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregateId {
    aggregate_type: String,
    id: String,
}

impl AggregateId {
    pub fn new(aggregate_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            id: id.into(),
        }
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl core::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.aggregate_type, self.id)
    }
}

/// A name disambiguated by a version string.
///
/// Used for both event and command type names, so that a renamed or
/// re-parameterised event can coexist with its older versions in the same
/// history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionedName {
    name: String,
    version: String,
}

impl VersionedName {
    /// Create a versioned name with the default version `"0"`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_version(name, "0")
    }

    pub fn with_version(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The canonical `name_version` rendering used in logs and wire formats.
    pub fn formatted(&self) -> String {
        format!("{}_{}", self.name, self.version)
    }
}

impl core::fmt::Display for VersionedName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}_{}", self.name, self.version)
    }
}

impl FromStr for VersionedName {
    type Err = core::convert::Infallible;

    /// Parse a `name_version` rendering; input without an underscore gets
    /// the default version.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.rsplit_once('_') {
            Some((name, version)) => Self::with_version(name, version),
            None => Self::new(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_id_displays_type_and_id() {
        let id = AggregateId::new("order", "o-123");
        assert_eq!(id.to_string(), "order:o-123");
        assert_eq!(id.aggregate_type(), "order");
        assert_eq!(id.id(), "o-123");
    }

    #[test]
    fn versioned_name_defaults_to_version_zero() {
        let name = VersionedName::new("created");
        assert_eq!(name.formatted(), "created_0");
    }

    #[test]
    fn versioned_name_parses_its_own_rendering() {
        let name = VersionedName::with_version("created", "2");
        assert_eq!(name.formatted().parse::<VersionedName>().unwrap(), name);
    }
}
