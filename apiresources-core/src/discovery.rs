//! Type information structs for API discovery
use crate::gvk::{GroupVersion, GroupVersionKind, GroupVersionResource, ParseGroupVersionError};
use base64::{engine::general_purpose::STANDARD, Engine};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResource;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Rbac verbs advertised by discovery
pub mod verbs {
    /// Create a resource
    pub const CREATE: &str = "create";
    /// Get single resource
    pub const GET: &str = "get";
    /// List objects
    pub const LIST: &str = "list";
    /// Watch for objects changes
    pub const WATCH: &str = "watch";
    /// Delete single object
    pub const DELETE: &str = "delete";
    /// Delete multiple objects at once
    pub const DELETE_COLLECTION: &str = "deletecollection";
    /// Update an object
    pub const UPDATE: &str = "update";
    /// Patch an object
    pub const PATCH: &str = "patch";
}

/// Resource scope
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum Scope {
    /// Objects are global
    Cluster,
    /// Each object lives in namespace.
    Namespaced,
}

/// Descriptor of a served API resource
///
/// The `Default` value is the zero descriptor returned for lookups that miss.
#[derive(Debug, Default, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResource {
    /// Resource group, empty for core group.
    pub group: String,
    /// Group version
    pub version: String,
    /// Plural name of the resource
    pub name: String,
    /// Singular PascalCase name of the resource
    pub kind: String,
    /// Whether objects of this resource live in a namespace
    pub namespaced: bool,
    /// Verbs supported on this resource
    pub verbs: Vec<String>,
    /// Opaque hash of the storage version
    #[serde(default)]
    pub storage_version_hash: String,
}

impl ApiResource {
    /// apiVersion of the resource (v1 for core group, groupName/groupVersions for other).
    pub fn api_version(&self) -> String {
        GroupVersion::gv(&self.group, &self.version).api_version()
    }

    /// The kind this resource serves
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(&self.group, &self.version, &self.kind)
    }

    /// The group/version/resource triple addressing this resource
    pub fn gvr(&self) -> GroupVersionResource {
        GroupVersionResource::gvr(&self.group, &self.version, &self.name)
    }

    /// Scope of the resource
    pub fn scope(&self) -> Scope {
        if self.namespaced {
            Scope::Namespaced
        } else {
            Scope::Cluster
        }
    }

    /// Checks that given verb is supported on this resource.
    pub fn supports_operation(&self, operation: &str) -> bool {
        self.verbs.iter().any(|op| op == operation)
    }

    /// Whether this is a subresource such as `pods/log`
    pub fn is_subresource(&self) -> bool {
        self.name.contains('/')
    }
}

/// Storage version hash the apiserver derives for a kind
///
/// The first 8 bytes of the SHA-256 digest of `<group>/<version>/<kind>`, base64 encoded.
/// The core group is the empty string, so pods hash `/v1/Pod`.
pub fn storage_version_hash(group: &str, version: &str, kind: &str) -> String {
    let digest = Sha256::digest(format!("{group}/{version}/{kind}"));
    STANDARD.encode(&digest[..8])
}

/// Creates an `ApiResource` from a `meta::v1::APIResource` instance + its groupversion.
///
/// Group and version set on the entry itself take precedence over the ones of the list.
/// An entry without a storage version hash gets the one computed from its resolved
/// group, version and kind.
pub fn parse_apiresource(ar: &APIResource, group_version: &str) -> Result<ApiResource, ParseGroupVersionError> {
    let gv: GroupVersion = group_version.parse()?;
    let group = ar.group.clone().filter(|g| !g.is_empty()).unwrap_or(gv.group);
    let version = ar.version.clone().filter(|v| !v.is_empty()).unwrap_or(gv.version);
    let storage_version_hash = match &ar.storage_version_hash {
        Some(hash) if !hash.is_empty() => hash.clone(),
        _ => storage_version_hash(&group, &version, &ar.kind),
    };
    Ok(ApiResource {
        group,
        version,
        name: ar.name.clone(),
        kind: ar.kind.clone(),
        namespaced: ar.namespaced,
        verbs: ar.verbs.clone(),
        storage_version_hash,
    })
}

/// Verbs retained on indexed resources, in canonical order
pub const WATCHABLE_VERBS: [&str; 2] = [verbs::LIST, verbs::WATCH];

/// Keeps only resources that can be listed and watched
///
/// Resources without a name or kind, subresources, and resources lacking either
/// `list` or `watch` are dropped. Survivors have their verbs narrowed to `[list, watch]`.
pub fn filter_watchable(mut ar: ApiResource) -> Option<ApiResource> {
    if ar.name.is_empty() || ar.kind.is_empty() || ar.is_subresource() {
        return None;
    }
    if !WATCHABLE_VERBS.iter().all(|verb| ar.supports_operation(verb)) {
        return None;
    }
    ar.verbs = WATCHABLE_VERBS.iter().map(ToString::to_string).collect();
    Some(ar)
}
