//! Registration driven by the installer script and host agents.

use crate::{
    core::domain::{
        error::{RegistryError, RegistryResult, UpstreamOperation, ValidationError},
        model::{
            client_config::ClientConfig,
            cluster_detection::ClusterDetection,
            events::EventPayload,
            inventory::NodeInventory,
            node_record::{Credentials, NodeDetails, NodeRecord, NodeSource},
        },
        value_object::{NodeHost, NodeId, NodeKind, OrgId, normalize_username},
    },
    registry::application::{
        request::auto_register_request::AutoRegisterRequest,
        response::{
            add_node_response::ClusterMergeResponse,
            auto_register_response::{AutoRegisterOutcome, AutoRegisterResponse},
        },
        service::registration_engine::{
            RegistrationEngine, TenantState, apply_cluster_detection, merge_endpoints,
        },
    },
};
use std::collections::HashMap;
use std::net::IpAddr;

/// A token-authenticated node ready to be matched against the inventory.
struct Registration {
    kind: NodeKind,
    host: NodeHost,
    /// Name the node reports for itself, may be empty
    server_name: String,
    token_id: String,
    token_value: String,
    source: Option<NodeSource>,
    fingerprint: Option<String>,
}

/// An existing record the registering host was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdentityMatch {
    id: NodeId,
    /// Keep the stored host string instead of the address the caller reported
    preserve_host: bool,
}

enum Committed {
    /// `host` is the canonical host the record was stored under
    Stored { name: String, host: NodeHost },
    Merged(ClusterMergeResponse),
}

impl RegistrationEngine {
    /// Registers or re-registers a node that presents its own API token.
    ///
    /// The caller must already be authenticated; see
    /// [`admit_auto_register`](Self::admit_auto_register).
    ///
    /// # Errors
    /// `Validation` for missing fields or a bad host, `Forbidden` in mock mode,
    /// `Persistence` when the store refuses the save.
    pub async fn auto_register(
        &self,
        org: &OrgId,
        request: AutoRegisterRequest,
    ) -> RegistryResult<AutoRegisterOutcome> {
        self.ensure_mutable()?;
        if [
            &request.node_type,
            &request.host,
            &request.token_id,
            &request.token_value,
        ]
        .iter()
        .any(|field| field.trim().is_empty())
        {
            tracing::error!(?request, "auto-register request is missing required fields");
            return Err(ValidationError::Format("Missing required fields".to_string()).into());
        }

        let kind: NodeKind = request.node_type.parse()?;
        let host = NodeHost::parse(&request.host, kind)?;
        let fingerprint = self.capture_fingerprint(&host).await;
        tracing::info!(
            %kind,
            %host,
            token_id = %request.token_id,
            server_name = %request.server_name,
            source = %request.source,
            "processing auto-register request"
        );

        let registration = Registration {
            kind,
            host,
            server_name: request.server_name.trim().to_string(),
            token_id: request.token_id.trim().to_string(),
            token_value: request.token_value.trim().to_string(),
            source: NodeSource::from_request(&request.source),
            fingerprint,
        };
        let event_name = registration.server_name.clone();
        let token_id = registration.token_id.clone();

        match self.commit_registration(org, registration).await? {
            Committed::Merged(merge) => Ok(AutoRegisterOutcome::Merged(merge)),
            Committed::Stored { name, host } => {
                tracing::info!(node = %name, %kind, %host, "node auto-registered");
                self.broadcast(EventPayload::NodeAutoRegistered {
                    node_type: kind,
                    host: host.as_str().to_string(),
                    name: event_name,
                    token_id,
                    has_token: true,
                    verify_ssl: true,
                    status: "connected".to_string(),
                });
                Ok(AutoRegisterOutcome::Registered(AutoRegisterResponse {
                    status: "success",
                    message: format!("Node {} auto-registered successfully", request.host),
                    node_id: request.host,
                    token_id: None,
                    token_value: None,
                    action: None,
                }))
            }
        }
    }

    /// Registers a node by minting its monitoring token with one-time credentials.
    ///
    /// The password is used for this single call and never stored.
    ///
    /// # Errors
    /// `Validation` for missing fields, `InvalidKind` for PMG, `Upstream` when the node
    /// cannot be reached or refuses to create the token.
    pub async fn register_with_credentials(
        &self,
        org: &OrgId,
        request: AutoRegisterRequest,
    ) -> RegistryResult<AutoRegisterOutcome> {
        self.ensure_mutable()?;
        if [
            &request.node_type,
            &request.host,
            &request.username,
            &request.password,
        ]
        .iter()
        .any(|field| field.trim().is_empty())
        {
            tracing::error!(?request, "credential registration is missing required fields");
            return Err(ValidationError::Format("Missing required fields".to_string()).into());
        }

        let kind: NodeKind = request.node_type.parse()?;
        if kind == NodeKind::Pmg {
            return Err(RegistryError::InvalidKind(
                "Token creation is only supported for PVE and PBS".to_string(),
            ));
        }
        let host = NodeHost::parse(&request.host, kind)?;
        let fingerprint = self.capture_fingerprint(&host).await;
        let username = normalize_username(request.username.trim(), kind);
        tracing::info!(%kind, %host, %username, "processing credential registration");

        let config = ClientConfig {
            verify_ssl: true,
            ..ClientConfig::new(
                host.as_str(),
                Credentials::password(username, request.password.clone()),
            )
        }
        .with_fingerprint(fingerprint.clone())
        .with_timeout(self.config.connection_test_timeout);

        let token_name = self.monitoring_token_name();
        let token = match kind {
            NodeKind::Pve => {
                let client = self
                    .clients
                    .pve(&config)
                    .await
                    .map_err(|e| RegistryError::upstream(UpstreamOperation::CreateClient, e))?;
                client.create_monitoring_token(&token_name).await
            }
            NodeKind::Pbs | NodeKind::Pmg => {
                let client = self
                    .clients
                    .pbs(&config)
                    .await
                    .map_err(|e| RegistryError::upstream(UpstreamOperation::CreateClient, e))?;
                client.create_monitoring_token(&token_name).await
            }
        }
        .map_err(|e| {
            tracing::error!(%host, error = %e, "failed to create monitoring token");
            RegistryError::upstream(UpstreamOperation::TokenCreation, e)
        })?;
        tracing::info!(%host, token_id = %token.token_id, "created monitoring token via API");

        let server_name = match request.server_name.trim() {
            "" => host.hostname().to_string(),
            name => name.to_string(),
        };
        let registration = Registration {
            kind,
            host,
            server_name: server_name.clone(),
            token_id: token.token_id.clone(),
            token_value: token.token_value.clone(),
            source: NodeSource::from_request(&request.source),
            fingerprint,
        };

        let message = match self.commit_registration(org, registration).await? {
            Committed::Stored { .. } => format!("Node {} registered successfully", request.host),
            Committed::Merged(merge) => merge.message,
        };
        Ok(AutoRegisterOutcome::Registered(AutoRegisterResponse {
            status: "success",
            message,
            node_id: server_name,
            token_id: Some(token.token_id),
            token_value: Some(token.token_value),
            action: Some("create_token"),
        }))
    }

    async fn capture_fingerprint(&self, host: &NodeHost) -> Option<String> {
        match self.fingerprints.fetch(host.as_str()).await {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                tracing::warn!(%host, error = %e, "failed to fetch TLS fingerprint for auto-register");
                None
            }
        }
    }

    /// Matches, probes and stores a registration, then notifies the monitor.
    async fn commit_registration(
        &self,
        org: &OrgId,
        registration: Registration,
    ) -> RegistryResult<Committed> {
        let state = self.tenant(org).await?;
        let agent_ip = (registration.source == Some(NodeSource::Agent))
            .then(|| registration.host.ip())
            .flatten();

        let snapshot = state.nodes.read().await.clone();
        let mut resolved = HashMap::new();
        let mut identity = find_identity(&snapshot, &registration, agent_ip, &resolved);
        if identity.is_none() && agent_ip.is_some() {
            resolved = self.resolve_hosts(&snapshot, registration.kind).await;
            identity = find_identity(&snapshot, &registration, agent_ip, &resolved);
        }
        let detection = self
            .detection_for(org, &snapshot, &registration, identity)
            .await;

        let mut nodes = state.nodes.write().await;
        let identity = find_identity(&nodes, &registration, agent_ip, &resolved);
        let mut next = nodes.clone();

        let (name, stored_host) = match identity {
            Some(matched) => update_matched(&mut next, matched, &registration, detection)?,
            None => {
                if let Some(detection) = detection.as_ref().filter(|d| d.is_mergeable()) {
                    if let Some(owner_id) = next.find_cluster(&detection.cluster_name) {
                        let merge = merge_into_cluster(&mut next, owner_id, detection)?;
                        self.persist(&state, &mut nodes, next).await?;
                        drop(nodes);
                        self.reload_after_registration(&state).await;
                        self.broadcast(EventPayload::NodesUpdated {
                            node_type: NodeKind::Pve,
                            action: "cluster_merge".to_string(),
                        });
                        return Ok(Committed::Merged(merge));
                    }
                }
                insert_new(&mut next, &registration, detection)
            }
        };

        self.persist(&state, &mut nodes, next).await?;
        drop(nodes);
        tracing::info!(node = %name, host = %stored_host, "auto-registration saved");

        self.recent.mark(org, registration.kind, &name);
        self.reload_after_registration(&state).await;
        self.refresh_discovery(&state).await;
        Ok(Committed::Stored {
            name,
            host: stored_host,
        })
    }

    /// Addresses of every stored host of `kind` that is configured by name.
    async fn resolve_hosts(
        &self,
        snapshot: &NodeInventory,
        kind: NodeKind,
    ) -> HashMap<String, IpAddr> {
        let mut resolved = HashMap::new();
        for record in snapshot.nodes(kind) {
            if record.host.ip().is_some() {
                continue;
            }
            if let Some(ip) = self.resolver.resolve(record.host.as_str()).await {
                resolved.insert(record.host.as_str().to_string(), ip);
            }
        }
        resolved
    }

    /// Probe result to fold into the registration, if one is due.
    ///
    /// New PVE nodes are always probed; a matched PVE record only while it is not
    /// yet known as a cluster, and at most once per cooldown period.
    async fn detection_for(
        &self,
        org: &OrgId,
        snapshot: &NodeInventory,
        registration: &Registration,
        identity: Option<IdentityMatch>,
    ) -> Option<ClusterDetection> {
        if !registration.kind.supports_clusters() {
            return None;
        }
        let credentials =
            Credentials::token(registration.token_id.clone(), registration.token_value.clone());

        let (config, name, existing) = match identity {
            None => (
                ClientConfig {
                    verify_ssl: true,
                    ..ClientConfig::new(registration.host.as_str(), credentials)
                }
                .with_fingerprint(registration.fingerprint.clone()),
                registration.server_name.clone(),
                Vec::new(),
            ),
            Some(matched) => {
                let record = snapshot.get(matched.id)?;
                if record.is_cluster() {
                    return None;
                }
                if !self.cooldown.try_begin(&format!("{org}/{}", record.host)) {
                    tracing::debug!(node = %record.name, "cluster detection on cooldown");
                    return None;
                }
                let host = if matched.preserve_host {
                    record.host.as_str().to_string()
                } else {
                    registration.host.as_str().to_string()
                };
                let existing = record
                    .pve()
                    .map(|pve| pve.cluster_endpoints.clone())
                    .unwrap_or_default();
                let config = ClientConfig {
                    credentials,
                    ..ClientConfig::from_record(&record)
                }
                .with_host(host);
                (config, record.name.clone(), existing)
            }
        };
        Some(self.detect_cluster(&config, &name, &existing).await)
    }

    /// Monitor reload after an auto-registration; the change is already committed.
    async fn reload_after_registration(&self, state: &TenantState) {
        match state.context.monitor.reload().await {
            Ok(()) => tracing::info!("monitor reloaded after auto-registration"),
            Err(e) => tracing::error!(error = %e, "failed to reload monitor after auto-registration"),
        }
    }
}

/// Recognizes a registering host among the stored records of its kind.
///
/// Three passes, the first that matches any record wins: identical canonical host,
/// then same name and token ID (the host came back with a new DHCP lease), then for
/// agents the same IP as a stored host, literal or resolved through `resolved`.
fn find_identity(
    nodes: &NodeInventory,
    registration: &Registration,
    agent_ip: Option<IpAddr>,
    resolved: &HashMap<String, IpAddr>,
) -> Option<IdentityMatch> {
    let kind = registration.kind;
    let records = nodes.nodes(kind);
    let at = |index| NodeId::new(kind, index);

    if let Some(index) = records.iter().position(|r| r.host == registration.host) {
        return Some(IdentityMatch {
            id: at(index),
            preserve_host: false,
        });
    }

    if !registration.server_name.is_empty() {
        let same_host = records.iter().position(|r| {
            r.name.eq_ignore_ascii_case(&registration.server_name)
                && r.credentials.token_id() == Some(registration.token_id.as_str())
        });
        if let Some(index) = same_host {
            let record = &records[index];
            tracing::info!(
                old_host = %record.host,
                new_host = %registration.host,
                node = %record.name,
                "detected IP change for existing node"
            );
            return Some(IdentityMatch {
                id: at(index),
                preserve_host: record.source == NodeSource::Agent,
            });
        }
    }

    let agent_ip = agent_ip?;
    records
        .iter()
        .position(|r| {
            r.host
                .ip()
                .or_else(|| resolved.get(r.host.as_str()).copied())
                .is_some_and(|ip| ip.to_canonical() == agent_ip.to_canonical())
        })
        .map(|index| {
            tracing::info!(
                existing_host = %records[index].host,
                new_host = %registration.host,
                %agent_ip,
                "agent matched existing node by IP, preserving configured host"
            );
            IdentityMatch {
                id: at(index),
                preserve_host: true,
            }
        })
}

/// Rotates the secret of a recognized record and returns its name and stored host.
fn update_matched(
    nodes: &mut NodeInventory,
    matched: IdentityMatch,
    registration: &Registration,
    detection: Option<ClusterDetection>,
) -> RegistryResult<(String, NodeHost)> {
    let foreign_cluster = detection
        .as_ref()
        .filter(|d| d.is_cluster)
        .and_then(|d| nodes.find_cluster(&d.cluster_name))
        .is_some_and(|owner| owner != matched.id);

    let record = nodes
        .get_mut(matched.id)
        .ok_or_else(|| RegistryError::Internal("matched record vanished".to_string()))?;
    if !matched.preserve_host {
        record.host = registration.host.clone();
    }
    record.credentials = Credentials::token(
        registration.token_id.clone(),
        registration.token_value.clone(),
    );
    if let Some(source) = registration.source {
        record.source = source;
    }
    if record.fingerprint.is_none() {
        record.fingerprint = registration.fingerprint.clone();
    }

    if let Some(detection) = detection.filter(|d| d.is_cluster) {
        if foreign_cluster {
            tracing::warn!(
                cluster = %detection.cluster_name,
                node = %record.name,
                "cluster already configured on another node, not upgrading"
            );
        } else if !record.is_cluster() {
            tracing::info!(
                cluster = %detection.cluster_name,
                endpoints = detection.endpoints.len(),
                "detected Proxmox cluster during auto-registration update"
            );
            apply_cluster_detection(record, detection);
        }
    }

    tracing::info!(
        node = %record.name,
        host = %record.host,
        token_id = %registration.token_id,
        "updated existing node with new token"
    );
    Ok((record.name.clone(), record.host.clone()))
}

fn merge_into_cluster(
    nodes: &mut NodeInventory,
    owner_id: NodeId,
    detection: &ClusterDetection,
) -> RegistryResult<ClusterMergeResponse> {
    let owner = nodes
        .get_mut(owner_id)
        .ok_or_else(|| RegistryError::Internal("cluster record vanished".to_string()))?;
    tracing::info!(
        cluster = %detection.cluster_name,
        existing = %owner.name,
        "auto-registered node belongs to an already configured cluster, merging endpoints"
    );
    merge_endpoints(owner, detection.endpoints.clone());
    Ok(ClusterMergeResponse {
        success: true,
        merged: true,
        cluster: detection.cluster_name.clone(),
        existing_node: owner.name.clone(),
        message: format!(
            "Agent merged into existing cluster '{}'",
            detection.cluster_name
        ),
        total_endpoints: owner.pve().map_or(0, |pve| pve.cluster_endpoints.len()),
    })
}

/// Appends a new record and returns its display name and host.
fn insert_new(
    nodes: &mut NodeInventory,
    registration: &Registration,
    detection: Option<ClusterDetection>,
) -> (String, NodeHost) {
    let kind = registration.kind;
    let name = match registration.server_name.as_str() {
        "" => registration.host.hostname().to_string(),
        name => name.to_string(),
    };
    let display_name = nodes.disambiguate_name(kind, &name, &registration.host);

    let mut record = NodeRecord::new(
        kind,
        display_name.clone(),
        registration.host.clone(),
        Credentials::token(
            registration.token_id.clone(),
            registration.token_value.clone(),
        ),
    );
    record.verify_ssl = true;
    record.fingerprint = registration.fingerprint.clone();
    record.source = registration.source.unwrap_or(NodeSource::Script);
    if let NodeDetails::Pbs(pbs) = &mut record.details {
        pbs.monitor_datastores = true;
        pbs.monitor_sync_jobs = true;
        pbs.monitor_verify_jobs = true;
        pbs.monitor_prune_jobs = true;
    }
    if let Some(detection) = detection.filter(|d| d.is_cluster) {
        tracing::info!(
            cluster = %detection.cluster_name,
            endpoints = detection.endpoints.len(),
            "added new Proxmox cluster via auto-registration"
        );
        apply_cluster_detection(&mut record, detection);
    }

    nodes.insert(record);
    tracing::info!(node = %display_name, host = %registration.host, %kind, "added new node via auto-registration");
    (display_name, registration.host.clone())
}
