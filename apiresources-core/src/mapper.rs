//! Mapping between resources and kinds.
use crate::{
    discovery::{ApiResource, Scope},
    gvk::{GroupVersion, GroupVersionKind, GroupVersionResource},
};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Possible errors when resolving resources to kinds
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MapperError {
    /// Nothing registered matches the requested resource
    #[error("no matches for {0}")]
    NoResourceMatch(GroupVersionResource),

    /// The requested resource matches more than one kind
    #[error("{resource} matches multiple kinds {kinds:?}")]
    AmbiguousResource {
        /// The requested resource
        resource: GroupVersionResource,
        /// Every kind that matched
        kinds: Vec<GroupVersionKind>,
    },
}

/// Resolves group/version/resource triples to the kinds they serve
pub trait RestMapper: Send + Sync {
    /// Find the kind served by `gvr`
    ///
    /// An empty version matches any registered version.
    fn kind_for(&self, gvr: &GroupVersionResource) -> Result<GroupVersionKind, MapperError>;
}

/// A `RestMapper` seeded explicitly with kinds and their scopes
///
/// Resource names are matched case-insensitively against both the plural and singular
/// names registered for a kind.
#[derive(Debug, Default, Clone)]
pub struct DefaultRestMapper {
    default_group_versions: Vec<GroupVersion>,
    resource_to_kind: HashMap<GroupVersionResource, GroupVersionKind>,
    kind_to_scope: HashMap<GroupVersionKind, Scope>,
}

impl DefaultRestMapper {
    /// Create an empty mapper that prefers the given group versions in order
    #[must_use]
    pub fn new(default_group_versions: Vec<GroupVersion>) -> Self {
        Self {
            default_group_versions,
            ..Self::default()
        }
    }

    /// Build a mapper from discovered resources
    #[must_use]
    pub fn from_resources<'a>(resources: impl IntoIterator<Item = &'a ApiResource>) -> Self {
        let mut mapper = Self::default();
        for ar in resources {
            let singular = ar.kind.to_ascii_lowercase();
            mapper.add_specific(ar.gvk(), &ar.name, &singular, ar.scope());
        }
        mapper
    }

    /// Register a kind, guessing its plural name
    pub fn add(&mut self, gvk: GroupVersionKind, scope: Scope) {
        let singular = gvk.kind.to_ascii_lowercase();
        let plural = to_plural(&singular);
        self.add_specific(gvk, &plural, &singular, scope);
    }

    /// Register a kind under explicit plural and singular resource names
    pub fn add_specific(&mut self, gvk: GroupVersionKind, plural: &str, singular: &str, scope: Scope) {
        for name in [plural, singular] {
            let gvr = GroupVersionResource::gvr(&gvk.group, &gvk.version, &name.to_ascii_lowercase());
            self.resource_to_kind.insert(gvr, gvk.clone());
        }
        self.kind_to_scope.insert(gvk, scope);
    }

    /// The scope a kind was registered with
    pub fn scope_for(&self, gvk: &GroupVersionKind) -> Option<Scope> {
        self.kind_to_scope.get(gvk).copied()
    }

    fn version_rank(&self, gvk: &GroupVersionKind) -> usize {
        self.default_group_versions
            .iter()
            .position(|gv| gv.group == gvk.group && gv.version == gvk.version)
            .unwrap_or(usize::MAX)
    }
}

impl RestMapper for DefaultRestMapper {
    fn kind_for(&self, gvr: &GroupVersionResource) -> Result<GroupVersionKind, MapperError> {
        let resource = gvr.resource.to_ascii_lowercase();
        let matches = self
            .resource_to_kind
            .iter()
            .filter(|(candidate, _)| {
                candidate.resource == resource
                    && candidate.group == gvr.group
                    && (gvr.version.is_empty() || candidate.version == gvr.version)
            })
            .map(|(_, gvk)| gvk.clone())
            .collect::<BTreeSet<_>>();

        let mut kinds = matches.into_iter().collect::<Vec<_>>();
        kinds.sort_by_key(|gvk| self.version_rank(gvk));
        match kinds.len() {
            0 => Err(MapperError::NoResourceMatch(gvr.clone())),
            1 => Ok(kinds.remove(0)),
            _ if kinds.iter().all(|gvk| gvk.kind == kinds[0].kind) => Ok(kinds.remove(0)),
            _ => Err(MapperError::AmbiguousResource {
                resource: gvr.clone(),
                kinds,
            }),
        }
    }
}

// Simple pluralizer. Handles the special cases.
fn to_plural(word: &str) -> String {
    if word == "endpoints" || word == "endpointslices" {
        return word.to_owned();
    } else if word == "nodemetrics" {
        return "nodes".to_owned();
    } else if word == "podmetrics" {
        return "pods".to_owned();
    }

    // Words ending in s, x, z, ch, sh will be pluralized with -es (eg. foxes).
    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }

    // Words ending in y that are preceded by a consonant will be pluralized by
    // replacing y with -ies (eg. puppies).
    if word.ends_with('y') {
        if let Some(c) = word.chars().rev().nth(1) {
            if !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u') {
                let mut chars = word.chars();
                chars.next_back();
                return format!("{}ies", chars.as_str());
            }
        }
    }

    format!("{word}s")
}
