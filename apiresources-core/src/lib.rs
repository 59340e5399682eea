//! Types for indexing the API resources a Kubernetes cluster serves
//!
//! This crate carries no client. It describes discovered resources, decides which of them
//! are worth indexing, and resolves resources to kinds through a [`RestMapper`].
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod discovery;
pub use discovery::{filter_watchable, parse_apiresource, storage_version_hash, verbs, ApiResource, Scope};

pub mod gvk;
pub use gvk::{GroupVersion, GroupVersionKind, GroupVersionResource, ParseGroupVersionError};

pub mod mapper;
pub use mapper::{DefaultRestMapper, MapperError, RestMapper};
