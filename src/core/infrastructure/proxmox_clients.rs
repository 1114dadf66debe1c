//! Per-product API clients built on [`ApiClient`].

use crate::{
    config::ApiClientConfig,
    core::{
        domain::{
            contract::{ClientFactory, PbsApi, PmgApi, PveApi},
            error::UpstreamError,
            model::{
                client_config::ClientConfig,
                node_list_item::NodeListItem,
                proxmox_api::{
                    ClusterStatusEntry, Datastore, MonitoringToken, NodeNetworkInterface,
                    ProductVersion,
                },
            },
            value_object::NodeKind,
        },
        infrastructure::api_client::ApiClient,
    },
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const PVE_MONITOR_USER: &str = "pulse-monitor@pam";
const PBS_MONITOR_USER: &str = "pulse-monitor@pbs";

/// Token creation answer on PVE.
#[derive(Deserialize)]
struct PveTokenResponse {
    #[serde(rename = "full-tokenid")]
    full_tokenid: String,
    value: String,
}

/// Token creation answer on PBS.
#[derive(Deserialize)]
struct PbsTokenResponse {
    tokenid: String,
    value: String,
}

/// Proxmox Virtual Environment client.
#[derive(Debug)]
pub struct PveClient {
    api: ApiClient,
}

impl PveClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PveApi for PveClient {
    async fn list_nodes(&self) -> Result<Vec<NodeListItem>, UpstreamError> {
        self.api.get("nodes").await
    }

    async fn cluster_status(&self) -> Result<Vec<ClusterStatusEntry>, UpstreamError> {
        self.api.get("cluster/status").await
    }

    async fn node_interfaces(
        &self,
        node: &str,
    ) -> Result<Vec<NodeNetworkInterface>, UpstreamError> {
        self.api.get(&format!("nodes/{}/network", node)).await
    }

    async fn version(&self) -> Result<ProductVersion, UpstreamError> {
        self.api.get("version").await
    }

    async fn create_monitoring_token(
        &self,
        token_name: &str,
    ) -> Result<MonitoringToken, UpstreamError> {
        // The user usually exists already from an earlier registration.
        if let Err(e) = self
            .api
            .post::<_, serde_json::Value>(
                "access/users",
                &json!({ "userid": PVE_MONITOR_USER, "comment": "Pulse monitoring service" }),
            )
            .await
        {
            tracing::debug!(error = %e, user = PVE_MONITOR_USER, "monitoring user not created");
        }

        self.api
            .put::<_, serde_json::Value>(
                "access/acl",
                &json!({ "path": "/", "roles": "PVEAuditor", "users": PVE_MONITOR_USER }),
            )
            .await?;

        let created: PveTokenResponse = self
            .api
            .post(
                &format!("access/users/{}/token/{}", PVE_MONITOR_USER, token_name),
                &json!({ "privsep": 0 }),
            )
            .await?;

        tracing::info!(token_id = %created.full_tokenid, "created PVE monitoring token");
        Ok(MonitoringToken {
            token_id: created.full_tokenid,
            token_value: created.value,
        })
    }
}

/// Proxmox Backup Server client.
#[derive(Debug)]
pub struct PbsClient {
    api: ApiClient,
}

impl PbsClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PbsApi for PbsClient {
    async fn version(&self) -> Result<ProductVersion, UpstreamError> {
        self.api.get("version").await
    }

    async fn datastores(&self) -> Result<Vec<Datastore>, UpstreamError> {
        self.api.get("admin/datastore").await
    }

    async fn create_monitoring_token(
        &self,
        token_name: &str,
    ) -> Result<MonitoringToken, UpstreamError> {
        if let Err(e) = self
            .api
            .post::<_, serde_json::Value>(
                "access/users",
                &json!({ "userid": PBS_MONITOR_USER, "comment": "Pulse monitoring service" }),
            )
            .await
        {
            tracing::debug!(error = %e, user = PBS_MONITOR_USER, "monitoring user not created");
        }

        self.api
            .put::<_, serde_json::Value>(
                "access/acl",
                &json!({ "path": "/", "role": "Audit", "auth-id": PBS_MONITOR_USER }),
            )
            .await?;

        let created: PbsTokenResponse = self
            .api
            .post(
                &format!("access/users/{}/token/{}", PBS_MONITOR_USER, token_name),
                &json!({ "comment": "Pulse monitoring token" }),
            )
            .await?;

        // Tokens on PBS need their own ACL entry; the user ACL alone is not inherited.
        if let Err(e) = self
            .api
            .put::<_, serde_json::Value>(
                "access/acl",
                &json!({ "path": "/", "role": "Audit", "auth-id": created.tokenid }),
            )
            .await
        {
            tracing::warn!(error = %e, token_id = %created.tokenid, "failed to grant token ACL");
        }

        tracing::info!(token_id = %created.tokenid, "created PBS monitoring token");
        Ok(MonitoringToken {
            token_id: created.tokenid,
            token_value: created.value,
        })
    }
}

/// Proxmox Mail Gateway client.
#[derive(Debug)]
pub struct PmgClient {
    api: ApiClient,
}

impl PmgClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PmgApi for PmgClient {
    async fn version(&self) -> Result<ProductVersion, UpstreamError> {
        self.api.get("version").await
    }
}

/// Builds reqwest-backed clients. Pinned fingerprints are enforced during the handshake.
#[derive(Debug, Clone, Default)]
pub struct HttpClientFactory {
    settings: ApiClientConfig,
}

impl HttpClientFactory {
    pub fn new(settings: ApiClientConfig) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ClientFactory for HttpClientFactory {
    async fn pve(&self, config: &ClientConfig) -> Result<Arc<dyn PveApi>, UpstreamError> {
        let api = ApiClient::new(NodeKind::Pve, config, &self.settings)?;
        Ok(Arc::new(PveClient::new(api)))
    }

    async fn pbs(&self, config: &ClientConfig) -> Result<Arc<dyn PbsApi>, UpstreamError> {
        let api = ApiClient::new(NodeKind::Pbs, config, &self.settings)?;
        Ok(Arc::new(PbsClient::new(api)))
    }

    async fn pmg(&self, config: &ClientConfig) -> Result<Arc<dyn PmgApi>, UpstreamError> {
        let api = ApiClient::new(NodeKind::Pmg, config, &self.settings)?;
        Ok(Arc::new(PmgClient::new(api)))
    }
}
