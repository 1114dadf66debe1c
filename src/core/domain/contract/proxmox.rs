use crate::core::domain::{
    error::UpstreamError,
    model::{
        client_config::ClientConfig,
        node_list_item::NodeListItem,
        proxmox_api::{
            ClusterStatusEntry, Datastore, MonitoringToken, NodeNetworkInterface, ProductVersion,
        },
    },
};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;

/// The PVE calls the registry makes.
#[async_trait]
pub trait PveApi: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeListItem>, UpstreamError>;

    async fn cluster_status(&self) -> Result<Vec<ClusterStatusEntry>, UpstreamError>;

    async fn node_interfaces(&self, node: &str)
    -> Result<Vec<NodeNetworkInterface>, UpstreamError>;

    async fn version(&self) -> Result<ProductVersion, UpstreamError>;

    /// Creates `pulse-monitor@pam` with audit rights and mints an API token for it.
    async fn create_monitoring_token(
        &self,
        token_name: &str,
    ) -> Result<MonitoringToken, UpstreamError>;
}

/// The PBS calls the registry makes.
#[async_trait]
pub trait PbsApi: Send + Sync {
    async fn version(&self) -> Result<ProductVersion, UpstreamError>;

    async fn datastores(&self) -> Result<Vec<Datastore>, UpstreamError>;

    /// Creates `pulse-monitor@pbs` with audit rights and mints an API token for it.
    async fn create_monitoring_token(
        &self,
        token_name: &str,
    ) -> Result<MonitoringToken, UpstreamError>;
}

/// The PMG calls the registry makes.
#[async_trait]
pub trait PmgApi: Send + Sync {
    async fn version(&self) -> Result<ProductVersion, UpstreamError>;
}

/// Builds short-lived API clients.
///
/// A pinned fingerprint in the config that does not match the live certificate makes
/// construction fail with [`UpstreamError::Tls`].
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn pve(&self, config: &ClientConfig) -> Result<Arc<dyn PveApi>, UpstreamError>;

    async fn pbs(&self, config: &ClientConfig) -> Result<Arc<dyn PbsApi>, UpstreamError>;

    async fn pmg(&self, config: &ClientConfig) -> Result<Arc<dyn PmgApi>, UpstreamError>;
}

/// Captures the SHA-256 fingerprint of the certificate a host presents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FingerprintFetcher: Send + Sync {
    async fn fetch(&self, host: &str) -> Result<String, UpstreamError>;
}

/// Resolves the host part of a URL to an address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Option<IpAddr>;
}
