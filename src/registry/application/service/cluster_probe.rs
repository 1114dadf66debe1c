//! Cluster membership detection for PVE endpoints.

use crate::{
    config::ProbeSettings,
    core::domain::{
        contract::{ClientFactory, ClusterProbe, FingerprintFetcher, PveApi},
        error::UpstreamError,
        model::{
            client_config::ClientConfig,
            cluster_detection::{ClusterDetection, UNKNOWN_CLUSTER, is_placeholder_cluster_name},
            cluster_endpoint::ClusterEndpoint,
            proxmox_api::{ClusterStatusEntry, NodeNetworkInterface},
        },
        value_object::{NodeHost, NodeKind, extract_ip, ips_on_same_network},
    },
};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::SystemTime;

/// Address ranges and name fragments reserved for automated test fixtures.
const SKIPPED_HOST_RANGES: [&str; 2] = ["192.168.77.", "192.168.88."];
const SKIPPED_NAME_FRAGMENTS: [&str; 3] = ["test-", "persist-", "concurrent-"];

/// Fixture hosts never get probed.
pub fn should_skip_cluster_detection(host: &str, name: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let name = name.to_ascii_lowercase();
    SKIPPED_HOST_RANGES
        .iter()
        .any(|range| host.contains(range))
        || SKIPPED_NAME_FRAGMENTS
            .iter()
            .any(|fragment| host.contains(fragment) || name.contains(fragment))
}

/// Probe that talks to the PVE API.
pub struct PveClusterProbe {
    clients: Arc<dyn ClientFactory>,
    fingerprints: Arc<dyn FingerprintFetcher>,
    settings: ProbeSettings,
}

#[derive(Debug, Default)]
struct PeerCheck {
    valid: bool,
    fingerprint: Option<String>,
}

impl PveClusterProbe {
    pub fn new(
        clients: Arc<dyn ClientFactory>,
        fingerprints: Arc<dyn FingerprintFetcher>,
        settings: ProbeSettings,
    ) -> Self {
        Self {
            clients,
            fingerprints,
            settings,
        }
    }

    /// `/cluster/status` with retries. `None` means standalone or unreachable.
    async fn cluster_status(&self, client: &dyn PveApi) -> Option<Vec<ClusterStatusEntry>> {
        let mut last_error = None;
        for attempt in 1..=self.settings.status_attempts.max(1) {
            if attempt > 1 {
                tracing::debug!(attempt, "retrying cluster detection");
                tokio::time::sleep(self.settings.backoff_unit * (attempt - 1)).await;
            }
            let result =
                tokio::time::timeout(self.settings.status_timeout, client.cluster_status()).await;
            match result {
                Ok(Ok(entries)) => return Some(entries),
                Ok(Err(e)) if e.is_not_implemented() => {
                    tracing::debug!(error = %e, "cluster API not available, standalone node");
                    return None;
                }
                Ok(Err(e)) => last_error = Some(e),
                Err(_) => last_error = Some(UpstreamError::Timeout),
            }
        }
        if let Some(e) = last_error {
            tracing::debug!(error = %e, "no cluster status after retries, treating as standalone");
        }
        None
    }

    /// Checks that a cluster member runs a Proxmox API, which filters out QDevice hosts.
    async fn validate_peer(
        &self,
        config: &ClientConfig,
        primary: &NodeHost,
        node: &ClusterStatusEntry,
    ) -> PeerCheck {
        let target_host = if node.ip.is_empty() { &node.name } else { &node.ip };
        if target_host.is_empty() {
            return PeerCheck::default();
        }
        let target = primary.with_hostname(target_host);
        let timeout = self.settings.validation_timeout;

        let fingerprint =
            match tokio::time::timeout(timeout, self.fingerprints.fetch(&target)).await {
                Ok(Ok(fp)) => Some(fp),
                Ok(Err(e)) => {
                    tracing::debug!(node = %node.name, error = %e, "could not fetch peer fingerprint");
                    None
                }
                Err(_) => None,
            };

        let peer_config = config.clone().with_host(target).with_timeout(timeout);
        let valid = match self.list_nodes(&peer_config).await {
            Err(e) if e.is_tls_mismatch() => {
                // Cluster members usually carry their own certificates.
                tracing::debug!(node = %node.name, "retrying peer validation without pinning");
                self.list_nodes(&peer_config.relaxed()).await
            }
            other => other,
        }
        .map_or_else(|e| e.is_permission_denied(), |_| true);

        if !valid {
            tracing::debug!(
                node = %node.name,
                ip = %node.ip,
                "skipping cluster member without a Proxmox API"
            );
        }
        PeerCheck { valid, fingerprint }
    }

    async fn list_nodes(&self, config: &ClientConfig) -> Result<(), UpstreamError> {
        let client = self.clients.pve(config).await?;
        match tokio::time::timeout(config.timeout, client.list_nodes()).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(UpstreamError::Timeout),
        }
    }

    /// A management-network address for `node` when its corosync address is on another
    /// network than the one the operator connected through.
    async fn preferred_ip(
        &self,
        client: &dyn PveApi,
        node: &ClusterStatusEntry,
        connection_ip: Option<IpAddr>,
    ) -> Option<String> {
        let connection_ip = connection_ip?;
        let cluster_ip: IpAddr = node.ip.parse().ok()?;
        if node.name.is_empty() || ips_on_same_network(cluster_ip, connection_ip) {
            return None;
        }

        let interfaces = match tokio::time::timeout(
            self.settings.interface_timeout,
            client.node_interfaces(&node.name),
        )
        .await
        {
            Ok(Ok(interfaces)) => interfaces,
            Ok(Err(e)) => {
                tracing::debug!(node = %node.name, error = %e, "could not query node interfaces");
                return None;
            }
            Err(_) => return None,
        };

        let preferred = find_preferred_ip(&interfaces, connection_ip)?;
        if preferred == node.ip {
            return None;
        }
        tracing::info!(
            node = %node.name,
            cluster_ip = %node.ip,
            preferred_ip = %preferred,
            connection_ip = %connection_ip,
            "found preferred management IP for cluster node"
        );
        Some(preferred)
    }
}

impl std::fmt::Debug for PveClusterProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PveClusterProbe")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ClusterProbe for PveClusterProbe {
    async fn probe(
        &self,
        config: &ClientConfig,
        instance_name: &str,
        existing: &[ClusterEndpoint],
    ) -> ClusterDetection {
        let status_config = config.clone().with_timeout(self.settings.status_timeout);
        let client = match self.clients.pve(&status_config).await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(host = %config.host, error = %e, "failed to create client for cluster detection");
                return ClusterDetection::standalone();
            }
        };

        let Some(entries) = self.cluster_status(client.as_ref()).await else {
            return ClusterDetection::standalone();
        };

        let mut cluster_name = String::new();
        let mut members = Vec::new();
        for entry in entries {
            if entry.is_cluster() {
                cluster_name = entry.name.clone();
            } else if entry.is_node() {
                members.push(entry);
            }
        }
        if members.len() < 2 {
            return ClusterDetection::standalone();
        }

        let primary = NodeHost::parse(&config.host, NodeKind::Pve)
            .unwrap_or_else(|_| NodeHost::new_unchecked(config.host.clone()));
        let connection_ip = extract_ip(&config.host);
        tracing::info!(
            cluster = %cluster_name,
            node = instance_name,
            nodes = members.len(),
            "detected Proxmox cluster"
        );

        let mut endpoints = Vec::new();
        let mut rejected = Vec::new();
        for member in &members {
            let check = self.validate_peer(config, &primary, member).await;
            if !check.valid {
                rejected.push(member);
                continue;
            }
            let mut endpoint = build_endpoint(member, &primary, existing, check.fingerprint);
            if endpoint.ip_override.is_empty() {
                if let Some(ip) = self.preferred_ip(client.as_ref(), member, connection_ip).await {
                    endpoint.ip_override = ip;
                }
            }
            endpoints.push(endpoint);
        }

        if endpoints.is_empty() && !rejected.is_empty() {
            tracing::warn!(
                cluster = %cluster_name,
                total_discovered = rejected.len(),
                "all cluster members failed validation, falling back to cluster metadata"
            );
            for member in rejected {
                if member.name.is_empty() && member.ip.is_empty() {
                    continue;
                }
                let mut endpoint = build_endpoint(member, &primary, existing, None);
                if endpoint.ip_override.is_empty() {
                    if let Some(ip) = self.preferred_ip(client.as_ref(), member, connection_ip).await {
                        endpoint.ip_override = ip;
                    }
                }
                endpoints.push(endpoint);
            }
        }

        tracing::info!(
            cluster = %cluster_name,
            total_discovered = members.len(),
            valid_proxmox_nodes = endpoints.len(),
            "cluster node validation complete"
        );

        if is_placeholder_cluster_name(&cluster_name) {
            cluster_name = if instance_name.trim().is_empty() {
                UNKNOWN_CLUSTER.to_string()
            } else {
                instance_name.trim().to_string()
            };
        }
        ClusterDetection::clustered(cluster_name, endpoints)
    }
}

/// Endpoint for a cluster member. Operator overrides and a previously captured
/// fingerprint are carried over from `existing`.
fn build_endpoint(
    member: &ClusterStatusEntry,
    primary: &NodeHost,
    existing: &[ClusterEndpoint],
    fingerprint: Option<String>,
) -> ClusterEndpoint {
    let previous = existing
        .iter()
        .find(|endpoint| endpoint.node_name == member.name);
    let pinned = previous
        .map(|endpoint| endpoint.fingerprint.clone())
        .filter(|fp| !fp.is_empty());

    ClusterEndpoint {
        node_id: member.id.clone(),
        node_name: member.name.clone(),
        host: if member.name.is_empty() {
            String::new()
        } else {
            primary.with_hostname(&member.name)
        },
        guest_url: previous
            .map(|endpoint| endpoint.guest_url.clone())
            .unwrap_or_default(),
        ip: member.ip.clone(),
        ip_override: previous
            .map(|endpoint| endpoint.ip_override.clone())
            .unwrap_or_default(),
        fingerprint: pinned.or(fingerprint).unwrap_or_default(),
        online: member.online,
        last_seen: SystemTime::now(),
    }
}

/// First active interface address on the same network as `reference`.
pub fn find_preferred_ip(interfaces: &[NodeNetworkInterface], reference: IpAddr) -> Option<String> {
    interfaces
        .iter()
        .filter(|iface| iface.active)
        .flat_map(|iface| [iface.address.as_deref(), iface.address6.as_deref()])
        .flatten()
        .find(|address| {
            address
                .parse::<IpAddr>()
                .is_ok_and(|ip| ips_on_same_network(ip, reference))
        })
        .map(str::to_string)
}
