//! Error handling in [`apiresources_runtime`][crate]
use apiresources_core::ParseGroupVersionError;
use thiserror::Error;

/// Possible errors when refreshing the resource index
#[derive(Error, Debug)]
pub enum Error {
    /// Enumerating the served resources failed; the previous index is kept
    #[error("failed to discover server resources: {0}")]
    Discovery(#[source] DiscoveryError),

    /// The watcher was constructed outside of a tokio runtime
    #[error("no tokio runtime available to schedule refreshes: {0}")]
    NoRuntime(#[source] tokio::runtime::TryCurrentError),
}

#[derive(Error, Debug)]
/// Possible errors when using API discovery
pub enum DiscoveryError {
    /// A resource list carried a group version that does not parse
    #[error("Invalid GroupVersion: {0}")]
    InvalidGroupVersion(#[source] ParseGroupVersionError),

    /// The apiserver could not be queried
    #[cfg(feature = "client")]
    #[cfg_attr(docsrs, doc(cfg(feature = "client")))]
    #[error("discovery request failed: {0}")]
    Request(#[source] kube::Error),

    /// Any other failure reported by a [`Discovery`](crate::Discovery) implementation
    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<DiscoveryError> for Error {
    fn from(err: DiscoveryError) -> Self {
        Error::Discovery(err)
    }
}

/// Convient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
