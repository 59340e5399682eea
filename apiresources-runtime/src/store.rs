//! Index of served API resources with atomic whole-index replacement
use ahash::AHashMap;
use apiresources_core::ApiResource;
use parking_lot::RwLock;
use std::sync::Arc;

/// Index key of a resource: `name` for the core group, `<group>.<name>` otherwise
pub fn index_key(name: &str, group: &str) -> String {
    if group.is_empty() {
        name.to_string()
    } else {
        format!("{group}.{name}")
    }
}

/// One immutable version of the index
#[derive(Debug, Default)]
struct Snapshot {
    /// Resources in discovery order
    resources: Vec<ApiResource>,
    /// Position of each key in `resources`
    positions: AHashMap<String, usize>,
}

impl Snapshot {
    fn build(resources: impl IntoIterator<Item = ApiResource>) -> Self {
        let mut snapshot = Snapshot::default();
        for ar in resources {
            let key = index_key(&ar.name, &ar.group);
            match snapshot.positions.get(&key) {
                Some(&pos) => snapshot.resources[pos] = ar,
                None => {
                    snapshot.positions.insert(key, snapshot.resources.len());
                    snapshot.resources.push(ar);
                }
            }
        }
        snapshot
    }
}

type SnapshotRef = Arc<RwLock<Arc<Snapshot>>>;

/// A writable index handle
///
/// This is exclusive since only the refresh pipeline may replace the index.
#[derive(Debug, Default)]
pub struct Writer {
    store: SnapshotRef,
}

impl Writer {
    /// Return a read handle to the index
    ///
    /// Multiple read handles may be obtained, by either calling `as_reader` multiple times,
    /// or by calling `Store::clone()` afterwards.
    #[must_use]
    pub fn as_reader(&self) -> Store {
        Store {
            store: self.store.clone(),
        }
    }

    /// Atomically install a new index built from `resources`
    ///
    /// When two resources share a key the later one wins, keeping the earlier position.
    pub fn replace(&mut self, resources: impl IntoIterator<Item = ApiResource>) {
        let snapshot = Arc::new(Snapshot::build(resources));
        *self.store.write() = snapshot;
    }
}

/// A readable index of served API resources
///
/// Cloning will produce a new reference to the same backing index.
///
/// Cannot be constructed directly since one writer handle is required,
/// use `Writer::as_reader()` instead.
#[derive(Debug, Clone)]
pub struct Store {
    store: SnapshotRef,
}

impl Store {
    fn snapshot(&self) -> Arc<Snapshot> {
        self.store.read().clone()
    }

    /// Return a full snapshot of the current resources, in discovery order
    #[must_use]
    pub fn list(&self) -> Vec<ApiResource> {
        self.snapshot().resources.clone()
    }

    /// Retrieve a `clone()` of the resource with the given plural `name` in `group`
    ///
    /// Pass an empty `group` for the core group.
    #[must_use]
    pub fn get(&self, name: &str, group: &str) -> Option<ApiResource> {
        let snapshot = self.snapshot();
        snapshot
            .positions
            .get(&index_key(name, group))
            .map(|&pos| snapshot.resources[pos].clone())
    }

    /// Number of indexed resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().resources.len()
    }

    /// Whether the index holds no resources
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::{index_key, Writer};
    use apiresources_core::ApiResource;

    fn resource(group: &str, name: &str) -> ApiResource {
        ApiResource {
            group: group.into(),
            version: "v1".into(),
            name: name.into(),
            namespaced: true,
            ..ApiResource::default()
        }
    }

    fn seeded() -> Writer {
        let mut writer = Writer::default();
        writer.replace([resource("", "pods"), resource("apps", "deployments")]);
        writer
    }

    #[test]
    fn keys_core_resources_by_name() {
        assert_eq!(index_key("pods", ""), "pods");
        assert_eq!(index_key("deployments", "apps"), "apps.deployments");
    }

    #[test]
    fn get_misses_return_none() {
        let store = seeded().as_reader();
        assert_eq!(store.get("notaresources", ""), None);
        assert_eq!(store.get("notaresources", "notagroup"), None);
        assert_eq!(store.get("deployments", ""), None);
    }

    #[test]
    fn get_finds_core_and_grouped_resources() {
        let store = seeded().as_reader();
        assert_eq!(store.get("pods", ""), Some(resource("", "pods")));
        assert_eq!(store.get("deployments", "apps"), Some(resource("apps", "deployments")));
    }

    #[test]
    fn list_is_a_detached_snapshot() {
        let mut writer = seeded();
        let store = writer.as_reader();
        let before = store.list();
        assert_eq!(before, store.list());

        writer.replace([resource("batch", "jobs")]);
        assert_eq!(before.len(), 2);
        assert_eq!(store.list(), vec![resource("batch", "jobs")]);
        assert_eq!(store.get("pods", ""), None);
    }

    #[test]
    fn empty_replace_clears_the_index() {
        let mut writer = seeded();
        writer.replace([]);
        let store = writer.as_reader();
        assert!(store.is_empty());
        assert_eq!(store.get("pods", ""), None);
    }

    #[test]
    fn duplicate_keys_keep_the_last_entry() {
        let mut writer = Writer::default();
        let mut newer = resource("", "pods");
        newer.version = "v2".into();
        writer.replace([resource("", "pods"), resource("apps", "deployments"), newer.clone()]);
        let store = writer.as_reader();
        assert_eq!(store.len(), 2);
        assert_eq!(store.list()[0], newer);
        assert_eq!(store.get("pods", ""), Some(newer));
    }
}
