//! Runtime keeping an index of the API resources a cluster serves
//!
//! The [`ApiResourceWatcher`] re-runs discovery whenever it is told that custom resource
//! definitions changed, coalescing bursts of changes into a single refresh, and swaps in the
//! new index atomically so readers never observe a partially refreshed state.
//!
//! ```rust,ignore
//! let discovery = Arc::new(client.clone());
//! let apis = ApiResourceWatcher::new(discovery, mapper, Config::default())?;
//! apis.refresh().await?;
//! let informer = apis.spawn_crd_informer(client);
//!
//! if let Some(pods) = apis.get("pods", "") {
//!     assert!(pods.namespaced);
//! }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod discovery;
pub use discovery::Discovery;

pub mod error;
pub use error::{DiscoveryError, Error, Result};

pub mod events;
pub use events::ResourceEventHandler;

pub mod store;
pub use store::{Store, Writer};

pub mod watcher;
pub use watcher::{ApiResourceWatcher, Config, ErrorSink};

/// Re-exports from apiresources_core
pub use apiresources_core as core;
