//! Notifications about objects being added, updated or deleted
//!
//! [`ResourceEventHandler`] is the seam between an event source and its consumers. With the
//! `client` feature, [`watch_custom_resource_definitions`] drives a handler from a watch on
//! `CustomResourceDefinition`s, whose changes are what alter the set of served resources.

/// Callbacks for changes to objects of type `K`
///
/// Handlers are invoked from whichever task runs the event source and must not block.
pub trait ResourceEventHandler<K>: Send + Sync {
    /// An object was seen for the first time
    fn on_add(&self, obj: &K);
    /// A known object changed
    fn on_update(&self, old: &K, new: &K);
    /// An object was deleted, or disappeared across a relist
    fn on_delete(&self, obj: &K);
}

#[cfg(feature = "client")]
pub use informer::{watch_custom_resource_definitions, InformerCache};

#[cfg(feature = "client")]
mod informer {
    use super::ResourceEventHandler;
    use ahash::{AHashMap, AHashSet};
    use futures::StreamExt;
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::{
        runtime::{reflector::ObjectRef, watcher, WatchStreamExt},
        Api, Client, Resource,
    };
    use std::hash::Hash;

    /// Last known state of every watched object
    ///
    /// Turns raw watcher events into add / update / delete callbacks. A relist that no longer
    /// contains a known object reports that object as deleted once the relist completes.
    pub struct InformerCache<K>
    where
        K: Resource,
        K::DynamicType: Eq + Hash + Clone,
    {
        known: AHashMap<ObjectRef<K>, K>,
        relisted: Option<AHashSet<ObjectRef<K>>>,
    }

    impl<K> Default for InformerCache<K>
    where
        K: Resource,
        K::DynamicType: Eq + Hash + Clone,
    {
        fn default() -> Self {
            Self {
                known: AHashMap::new(),
                relisted: None,
            }
        }
    }

    impl<K> InformerCache<K>
    where
        K: Resource + Clone,
        K::DynamicType: Default + Eq + Hash + Clone,
    {
        /// Applies a single watcher event, notifying `handler` of what changed
        pub fn apply_watcher_event<H>(&mut self, event: watcher::Event<K>, handler: &H)
        where
            H: ResourceEventHandler<K> + ?Sized,
        {
            match event {
                watcher::Event::Apply(obj) => self.applied(obj, handler),
                watcher::Event::Delete(obj) => {
                    self.known.remove(&ObjectRef::from_obj(&obj));
                    handler.on_delete(&obj);
                }
                watcher::Event::Init => self.relisted = Some(AHashSet::new()),
                watcher::Event::InitApply(obj) => {
                    if let Some(relisted) = &mut self.relisted {
                        relisted.insert(ObjectRef::from_obj(&obj));
                    }
                    self.applied(obj, handler);
                }
                watcher::Event::InitDone => {
                    let Some(relisted) = self.relisted.take() else {
                        return;
                    };
                    let gone = self
                        .known
                        .keys()
                        .filter(|key| !relisted.contains(*key))
                        .cloned()
                        .collect::<Vec<_>>();
                    for key in gone {
                        if let Some(obj) = self.known.remove(&key) {
                            handler.on_delete(&obj);
                        }
                    }
                }
            }
        }

        fn applied<H>(&mut self, obj: K, handler: &H)
        where
            H: ResourceEventHandler<K> + ?Sized,
        {
            match self.known.insert(ObjectRef::from_obj(&obj), obj.clone()) {
                Some(old) => handler.on_update(&old, &obj),
                None => handler.on_add(&obj),
            }
        }
    }

    /// Watch all `CustomResourceDefinition`s and forward their changes to `handler`
    ///
    /// Runs until the watch stream ends. Watch errors are logged and retried with the
    /// default backoff.
    pub async fn watch_custom_resource_definitions<H>(client: Client, handler: &H)
    where
        H: ResourceEventHandler<CustomResourceDefinition> + ?Sized,
    {
        let api: Api<CustomResourceDefinition> = Api::all(client);
        let mut cache = InformerCache::default();
        let mut events = watcher(api, watcher::Config::default()).default_backoff().boxed();
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => cache.apply_watcher_event(event, handler),
                Err(err) => tracing::warn!(error = %err, "custom resource definition watch failed"),
            }
        }
        tracing::debug!("custom resource definition watch ended");
    }

    #[cfg(test)]
    mod tests {
        use super::{InformerCache, ResourceEventHandler};
        use k8s_openapi::{
            apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
            apimachinery::pkg::apis::meta::v1::ObjectMeta,
        };
        use kube::{runtime::watcher::Event, ResourceExt};
        use parking_lot::Mutex;

        #[derive(Default)]
        struct Recorder(Mutex<Vec<String>>);

        impl ResourceEventHandler<CustomResourceDefinition> for Recorder {
            fn on_add(&self, obj: &CustomResourceDefinition) {
                self.0.lock().push(format!("add {}", obj.name_any()));
            }

            fn on_update(&self, _old: &CustomResourceDefinition, new: &CustomResourceDefinition) {
                self.0.lock().push(format!("update {}", new.name_any()));
            }

            fn on_delete(&self, obj: &CustomResourceDefinition) {
                self.0.lock().push(format!("delete {}", obj.name_any()));
            }
        }

        fn crd(name: &str) -> CustomResourceDefinition {
            CustomResourceDefinition {
                metadata: ObjectMeta {
                    name: Some(name.into()),
                    ..ObjectMeta::default()
                },
                ..CustomResourceDefinition::default()
            }
        }

        #[test]
        fn applies_become_adds_then_updates() {
            let recorder = Recorder::default();
            let mut cache = InformerCache::default();
            cache.apply_watcher_event(Event::Apply(crd("foos.example.com")), &recorder);
            cache.apply_watcher_event(Event::Apply(crd("foos.example.com")), &recorder);
            cache.apply_watcher_event(Event::Delete(crd("foos.example.com")), &recorder);
            assert_eq!(*recorder.0.lock(), vec![
                "add foos.example.com",
                "update foos.example.com",
                "delete foos.example.com",
            ]);
        }

        #[test]
        fn relist_deletes_objects_that_vanished() {
            let recorder = Recorder::default();
            let mut cache = InformerCache::default();
            cache.apply_watcher_event(Event::Apply(crd("foos.example.com")), &recorder);
            cache.apply_watcher_event(Event::Apply(crd("bars.example.com")), &recorder);
            cache.apply_watcher_event(Event::Init, &recorder);
            cache.apply_watcher_event(Event::InitApply(crd("bars.example.com")), &recorder);
            cache.apply_watcher_event(Event::InitApply(crd("bazs.example.com")), &recorder);
            cache.apply_watcher_event(Event::InitDone, &recorder);
            assert_eq!(*recorder.0.lock(), vec![
                "add foos.example.com",
                "add bars.example.com",
                "update bars.example.com",
                "add bazs.example.com",
                "delete foos.example.com",
            ]);
        }
    }
}
