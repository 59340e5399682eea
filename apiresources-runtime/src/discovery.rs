//! Enumeration of the resources an apiserver serves
use crate::error::DiscoveryError;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;

/// Capability to list every served resource, grouped by group version
///
/// Implementations should impose their own request timeouts; the refresh pipeline waits
/// for as long as this call takes.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Return the resource lists of all served group versions
    async fn list_server_resources(&self) -> Result<Vec<APIResourceList>, DiscoveryError>;
}

#[cfg(feature = "client")]
mod client {
    use super::{Discovery, DiscoveryError};
    use async_trait::async_trait;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::APIResourceList;
    use kube::Client;

    /// Queries `/api` for the core group and `/apis` for every other group
    ///
    /// Only one version per group is listed: the preferred version when the server names
    /// one, otherwise the first listed version.
    #[async_trait]
    impl Discovery for Client {
        async fn list_server_resources(&self) -> Result<Vec<APIResourceList>, DiscoveryError> {
            let mut lists = vec![];

            let core = self.list_core_api_versions().await.map_err(DiscoveryError::Request)?;
            if let Some(version) = core.versions.first() {
                let list = self
                    .list_core_api_resources(version)
                    .await
                    .map_err(DiscoveryError::Request)?;
                lists.push(list);
            }

            let api_groups = self.list_api_groups().await.map_err(DiscoveryError::Request)?;
            for g in api_groups.groups {
                let Some(gv) = g.preferred_version.or_else(|| g.versions.into_iter().next()) else {
                    tracing::debug!(group = %g.name, "skipping api group without versions");
                    continue;
                };
                let list = self
                    .list_api_group_resources(&gv.group_version)
                    .await
                    .map_err(DiscoveryError::Request)?;
                lists.push(list);
            }
            Ok(lists)
        }
    }
}
