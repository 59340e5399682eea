//! Keeps an index of served API resources fresh as custom resource definitions change
//!
//! Change notifications arrive through [`ResourceEventHandler`]. Every notification is a
//! request to refresh; requests that arrive close together are coalesced, so that a burst of
//! changes costs one discovery round trip:
//!
//! - the first request after a quiet period arms a worker which waits `queue_refresh_delay`
//! - every request increments a pending counter, the worker remembers how many it saw
//!   before starting a refresh cycle and subtracts exactly that many afterwards
//! - requests that landed during the cycle keep the counter positive and re-arm the worker
//!
//! At most one cycle runs at any time, and the counter only reaches zero once every request
//! has been served by a cycle that started after it.
use crate::{
    discovery::Discovery,
    error::{DiscoveryError, Error, Result},
    events::ResourceEventHandler,
    store::{Store, Writer},
};
use apiresources_core::{filter_watchable, parse_apiresource, ApiResource, GroupVersionResource, MapperError, RestMapper};
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{runtime::Handle, sync::Mutex};
use tokio_util::sync::CancellationToken;

/// Callback receiving errors from refreshes nobody awaits
pub type ErrorSink = Arc<dyn Fn(&Error) + Send + Sync>;

/// Configuration for the [`ApiResourceWatcher`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// How long to wait after a change before refreshing
    ///
    /// Further changes arriving within this window are absorbed into the same refresh.
    pub queue_refresh_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_refresh_delay: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Configure the coalescing window
    #[must_use]
    pub fn queue_refresh_delay(mut self, delay: Duration) -> Self {
        self.queue_refresh_delay = delay;
        self
    }
}

struct Inner {
    config: Config,
    discovery: Arc<dyn Discovery>,
    mapper: Arc<dyn RestMapper>,
    /// Held for the duration of a refresh cycle
    writer: Mutex<Writer>,
    reader: Store,
    pending: AtomicUsize,
    error_sink: ErrorSink,
    shutdown: CancellationToken,
    runtime: Handle,
}

/// A continuously refreshed index of the resources the apiserver can list and watch
///
/// Cloning produces another handle to the same index and refresh pipeline.
#[derive(Clone)]
pub struct ApiResourceWatcher {
    inner: Arc<Inner>,
}

impl fmt::Debug for ApiResourceWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiResourceWatcher")
            .field("config", &self.inner.config)
            .field("pending", &self.pending_refreshes())
            .field("resources", &self.inner.reader.len())
            .finish_non_exhaustive()
    }
}

impl ApiResourceWatcher {
    /// Create a watcher with an empty index
    ///
    /// Refreshes are spawned onto the tokio runtime this is called from. Call [`refresh`]
    /// to populate the index before the first change notification.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NoRuntime`] outside of a tokio runtime.
    ///
    /// [`refresh`]: ApiResourceWatcher::refresh
    pub fn new(discovery: Arc<dyn Discovery>, mapper: Arc<dyn RestMapper>, config: Config) -> Result<Self> {
        let runtime = Handle::try_current().map_err(Error::NoRuntime)?;
        let writer = Writer::default();
        let reader = writer.as_reader();
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                discovery,
                mapper,
                writer: Mutex::new(writer),
                reader,
                pending: AtomicUsize::new(0),
                error_sink: Arc::new(log_error),
                shutdown: CancellationToken::new(),
                runtime,
            }),
        })
    }

    /// Replace where errors from background refreshes are reported
    ///
    /// By default they are logged. Must be called before the watcher is cloned.
    #[must_use]
    pub fn with_error_sink(mut self, sink: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.error_sink = Arc::new(sink),
            None => tracing::warn!("error sink not installed: watcher already shared"),
        }
        self
    }

    /// Return a full snapshot of the indexed resources
    #[must_use]
    pub fn list(&self) -> Vec<ApiResource> {
        self.inner.reader.list()
    }

    /// Find the resource with plural `name` in `group`, the empty string being the core group
    #[must_use]
    pub fn get(&self, name: &str, group: &str) -> Option<ApiResource> {
        self.inner.reader.get(name, group)
    }

    /// A read handle on the index, independent of this watcher's lifetime
    #[must_use]
    pub fn store(&self) -> Store {
        self.inner.reader.clone()
    }

    /// Resolve the kind served by `gvr`
    ///
    /// # Errors
    ///
    /// Returns the mapper's error unchanged when `gvr` is unknown.
    pub fn get_kind_for_resource(&self, gvr: &GroupVersionResource) -> Result<String, MapperError> {
        self.inner.mapper.kind_for(gvr).map(|gvk| gvk.kind)
    }

    /// Number of refresh requests not yet served by a completed refresh cycle
    ///
    /// Only requests made through [`queue_refresh`] or the [`ResourceEventHandler`]
    /// callbacks are counted. A cycle started with [`refresh`] is invisible here, so zero
    /// does not rule out such a cycle being in flight.
    ///
    /// [`queue_refresh`]: ApiResourceWatcher::queue_refresh
    /// [`refresh`]: ApiResourceWatcher::refresh
    #[must_use]
    pub fn pending_refreshes(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Request a refresh of the index
    ///
    /// Returns immediately; the refresh runs after the coalescing window. Requests after
    /// [`shutdown`](ApiResourceWatcher::shutdown) are ignored.
    pub fn queue_refresh(&self) {
        if self.inner.shutdown.is_cancelled() {
            tracing::trace!("ignoring refresh request after shutdown");
            return;
        }
        if self.inner.pending.fetch_add(1, Ordering::AcqRel) == 0 {
            tracing::trace!("arming refresh worker");
            let inner = Arc::clone(&self.inner);
            self.inner.runtime.spawn(inner.run_queued_refreshes());
        }
    }

    /// Run one refresh cycle now
    ///
    /// Waits for any cycle already in flight to finish first.
    ///
    /// # Errors
    ///
    /// Fails when discovery fails, in which case the index is left untouched.
    pub async fn refresh(&self) -> Result<()> {
        self.inner.refresh().await
    }

    /// Stop scheduling refreshes
    ///
    /// A refresh cycle already in flight completes and its result is applied.
    pub fn shutdown(&self) {
        tracing::info!("shutting down api resource watcher");
        self.inner.shutdown.cancel();
    }

    /// Drive this watcher from a watch on `CustomResourceDefinition`s until shutdown
    #[cfg(feature = "client")]
    #[cfg_attr(docsrs, doc(cfg(feature = "client")))]
    pub fn spawn_crd_informer(&self, client: kube::Client) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        self.inner.runtime.spawn(async move {
            let shutdown = this.inner.shutdown.clone();
            tokio::select! {
                () = crate::events::watch_custom_resource_definitions(client, &this) => {},
                () = shutdown.cancelled() => tracing::debug!("stopping custom resource definition informer"),
            }
        })
    }
}

impl<K> ResourceEventHandler<K> for ApiResourceWatcher {
    fn on_add(&self, _obj: &K) {
        self.queue_refresh();
    }

    fn on_update(&self, _old: &K, _new: &K) {
        self.queue_refresh();
    }

    fn on_delete(&self, _obj: &K) {
        self.queue_refresh();
    }
}

impl Inner {
    async fn run_queued_refreshes(self: Arc<Self>) {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    self.pending.store(0, Ordering::Release);
                    tracing::debug!("dropping queued refresh on shutdown");
                    return;
                }
                () = tokio::time::sleep(self.config.queue_refresh_delay) => {}
            }

            let served = Served {
                observed: self.pending.load(Ordering::Acquire),
                inner: &self,
                finished: false,
            };
            if let Err(err) = self.refresh().await {
                (self.error_sink)(&err);
            }
            let remaining = served.finish();
            if remaining == 0 {
                return;
            }
            tracing::debug!(remaining, "resources changed during refresh, refreshing again");
        }
    }

    #[tracing::instrument(level = "debug", skip_all)]
    async fn refresh(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let lists = self.discovery.list_server_resources().await?;

        let mut resources = vec![];
        for list in &lists {
            for res in &list.resources {
                let ar = parse_apiresource(res, &list.group_version).map_err(DiscoveryError::InvalidGroupVersion)?;
                resources.extend(filter_watchable(ar));
            }
        }
        tracing::debug!(resources = resources.len(), "replacing api resource index");
        writer.replace(resources);
        Ok(())
    }
}

/// Refresh requests served by the running cycle
///
/// Releases them from the pending counter even when the cycle unwinds, in which case any
/// requests that arrived meanwhile are handed to a new worker.
struct Served<'a> {
    inner: &'a Arc<Inner>,
    observed: usize,
    finished: bool,
}

impl Served<'_> {
    fn release(&self) -> usize {
        self.inner.pending.fetch_sub(self.observed, Ordering::AcqRel) - self.observed
    }

    /// Release the served requests, returning how many arrived during the cycle
    fn finish(mut self) -> usize {
        self.finished = true;
        self.release()
    }
}

impl Drop for Served<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let remaining = self.release();
        tracing::warn!(remaining, "refresh worker unwound");
        if remaining > 0 {
            self.inner.runtime.spawn(Arc::clone(self.inner).run_queued_refreshes());
        }
    }
}

fn log_error(err: &Error) {
    tracing::error!(error = %err, "failed to refresh api resources");
}
