//! Type information structs for addressing API resources.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to parse group version: {0:?}")]
/// Failed to parse group version.
pub struct ParseGroupVersionError(pub String);

fn api_version(group: &str, version: &str) -> String {
    if group.is_empty() {
        version.to_string()
    } else {
        format!("{group}/{version}")
    }
}

/// Core information about an API kind.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupVersionKind {
    /// API group
    pub group: String,
    /// Version
    pub version: String,
    /// Kind
    pub kind: String,
}

impl GroupVersionKind {
    /// Construct from explicit group, version, and kind
    pub fn gvk(group_: &str, version_: &str, kind_: &str) -> Self {
        let version = version_.to_string();
        let group = group_.to_string();
        let kind = kind_.to_string();

        Self { group, version, kind }
    }

    /// Generate the apiVersion string used in a kind's yaml
    pub fn api_version(&self) -> String {
        api_version(&self.group, &self.version)
    }

    /// The [`GroupVersion`] this kind is served under
    pub fn group_version(&self) -> GroupVersion {
        GroupVersion::gv(&self.group, &self.version)
    }
}

impl fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// Core information about a family of API Resources
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersion {
    /// API group
    pub group: String,
    /// Version
    pub version: String,
}

impl GroupVersion {
    /// Construct from explicit group and version
    pub fn gv(group_: &str, version_: &str) -> Self {
        let version = version_.to_string();
        let group = group_.to_string();
        Self { group, version }
    }

    /// Generate the apiVersion string used in a kind's yaml
    pub fn api_version(&self) -> String {
        api_version(&self.group, &self.version)
    }

    /// Upgrade to a [`GroupVersionKind`]
    pub fn with_kind(self, kind: &str) -> GroupVersionKind {
        GroupVersionKind {
            group: self.group,
            version: self.version,
            kind: kind.into(),
        }
    }
}

impl FromStr for GroupVersion {
    type Err = ParseGroupVersionError;

    fn from_str(gv: &str) -> Result<Self, Self::Err> {
        let gvsplit = gv.splitn(2, '/').collect::<Vec<_>>();
        let (group, version) = match *gvsplit.as_slice() {
            [g, v] if !g.is_empty() && !v.is_empty() => (g.to_string(), v.to_string()), // standard case
            [v] if !v.is_empty() => ("".to_string(), v.to_string()),                     // core v1 case
            _ => return Err(ParseGroupVersionError(gv.into())),
        };
        Ok(Self { group, version })
    }
}

impl fmt::Display for GroupVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.api_version())
    }
}

/// Represents a type-erased object resource.
#[derive(Deserialize, Serialize, Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionResource {
    /// API group
    pub group: String,
    /// Version
    pub version: String,
    /// Plural resource name
    pub resource: String,
}

impl GroupVersionResource {
    /// Set the api group, version, and the plural resource name.
    pub fn gvr(group_: &str, version_: &str, resource_: &str) -> Self {
        let version = version_.to_string();
        let group = group_.to_string();
        let resource = resource_.to_string();

        Self {
            group,
            version,
            resource,
        }
    }

    /// Generate the apiVersion string for the resource's group and version
    pub fn api_version(&self) -> String {
        api_version(&self.group, &self.version)
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Resource={}", self.api_version(), self.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_and_named_group_versions() {
        let core: GroupVersion = "v1".parse().unwrap();
        assert_eq!(core, GroupVersion::gv("", "v1"));
        assert_eq!(core.api_version(), "v1");

        let apps: GroupVersion = "apps/v1".parse().unwrap();
        assert_eq!(apps, GroupVersion::gv("apps", "v1"));
        assert_eq!(apps.to_string(), "apps/v1");
    }

    #[test]
    fn rejects_empty_halves() {
        for bad in ["", "apps/", "/v1"] {
            assert_eq!(
                bad.parse::<GroupVersion>(),
                Err(ParseGroupVersionError(bad.to_string())),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn displays_like_apimachinery() {
        let gvk = GroupVersion::gv("apps", "v1").with_kind("Deployment");
        assert_eq!(gvk.to_string(), "apps/v1, Kind=Deployment");
        let gvr = GroupVersionResource::gvr("", "v1", "pods");
        assert_eq!(gvr.to_string(), "v1, Resource=pods");
    }
}
