//! Operator-driven mutations: add, update, delete and cluster refresh.

use crate::{
    core::domain::{
        error::{RegistryError, RegistryResult, ValidationError},
        model::{
            alert_config::AlertConfig,
            client_config::ClientConfig,
            events::EventPayload,
            node_record::{Credentials, NodeDetails, NodeRecord},
            proxmox_api::MonitoringToken,
        },
        value_object::{NodeHost, NodeId, NodeKind, OrgId, normalize_username, validate_username},
    },
    registry::application::{
        request::node_config_request::NodeConfigRequest,
        response::{
            add_node_response::{AddNodeOutcome, ClusterMergeResponse},
            cluster_refresh_response::ClusterRefreshResponse,
            node_response::NodeResponse,
        },
        service::registration_engine::{
            RegistrationEngine, TenantState, apply_cluster_detection, merge_endpoints,
        },
    },
};

impl RegistrationEngine {
    /// Adds a node configured by an operator.
    ///
    /// A PVE node that belongs to a cluster already represented by another record is
    /// folded into that record instead of being added.
    ///
    /// # Errors
    /// `Validation` for bad input, `Conflict` when the canonical host is taken,
    /// `Persistence` when the store refuses the save.
    pub async fn add(
        &self,
        org: &OrgId,
        request: NodeConfigRequest,
    ) -> RegistryResult<AddNodeOutcome> {
        self.ensure_mutable()?;
        tracing::info!(?request, "add node request received");

        let name = NodeConfigRequest::present(&request.name)
            .ok_or_else(|| ValidationError::field("name", "Name is required"))?
            .to_string();
        let kind: NodeKind = NodeConfigRequest::present(&request.node_type)
            .ok_or_else(|| ValidationError::field("type", "Type is required"))?
            .parse()?;
        let raw_host = NodeConfigRequest::present(&request.host)
            .ok_or_else(|| ValidationError::field("host", "Host is required"))?;
        let host = NodeHost::parse(raw_host, kind)?;
        self.check_temperature_monitoring(request.temperature_monitoring_enabled)?;
        let mut credentials = credentials_for_add(kind, &request)?;

        let state = self.tenant(org).await?;
        if state.nodes.read().await.host_taken(kind, &host, None) {
            return Err(duplicate_host());
        }

        let fingerprint = request
            .fingerprint
            .as_deref()
            .map(str::trim)
            .filter(|fp| !fp.is_empty())
            .map(str::to_string);
        let verify_ssl = request.verify_ssl.unwrap_or(false);

        let detection = if kind.supports_clusters() {
            let config = ClientConfig::new(host.as_str(), credentials.clone())
                .with_fingerprint(fingerprint.clone());
            let config = ClientConfig {
                verify_ssl,
                ..config
            };
            Some(self.detect_cluster(&config, &name, &[]).await)
        } else {
            None
        };

        if kind == NodeKind::Pbs {
            if let Credentials::Password { user, password } = &credentials {
                if let Some(token) = self.mint_pbs_token(&host, user, password).await {
                    credentials = Credentials::token(token.token_id, token.token_value);
                }
            }
        }

        let mut nodes = state.nodes.write().await;
        if nodes.host_taken(kind, &host, None) {
            return Err(duplicate_host());
        }

        if let Some(detection) = detection.as_ref().filter(|d| d.is_mergeable()) {
            if let Some(existing_id) = nodes.find_cluster(&detection.cluster_name) {
                let mut next = nodes.clone();
                let Some(existing) = next.get_mut(existing_id) else {
                    return Err(RegistryError::Internal("cluster record vanished".to_string()));
                };
                tracing::info!(
                    cluster = %detection.cluster_name,
                    existing = %existing.name,
                    node = %name,
                    "node belongs to an already configured cluster, merging endpoints"
                );
                merge_endpoints(existing, detection.endpoints.clone());
                let response = ClusterMergeResponse {
                    success: true,
                    merged: true,
                    cluster: detection.cluster_name.clone(),
                    existing_node: existing.name.clone(),
                    message: format!(
                        "Node merged into existing cluster '{}' (already configured as '{}')",
                        detection.cluster_name, existing.name
                    ),
                    total_endpoints: existing
                        .pve()
                        .map_or(0, |pve| pve.cluster_endpoints.len()),
                };
                self.persist(&state, &mut nodes, next).await?;
                drop(nodes);

                self.apply(&state).await?;
                self.broadcast(EventPayload::NodesUpdated {
                    node_type: NodeKind::Pve,
                    action: "cluster_merge".to_string(),
                });
                return Ok(AddNodeOutcome::Merged(response));
            }
        }

        let display_name = nodes.disambiguate_name(kind, &name, &host);
        let mut record = NodeRecord::new(kind, display_name, host, credentials);
        record.guest_url = NodeConfigRequest::present(&request.guest_url)
            .unwrap_or_default()
            .to_string();
        record.fingerprint = fingerprint;
        record.verify_ssl = verify_ssl;
        record.temperature_monitoring_enabled = request.temperature_monitoring_enabled;
        apply_monitoring_flags(&mut record, &request);
        if let NodeDetails::Pmg(pmg) = &mut record.details {
            let other_enabled = [
                request.monitor_queues,
                request.monitor_quarantine,
                request.monitor_domain_stats,
            ]
            .contains(&Some(true));
            if request.monitor_mail_stats.is_none() && other_enabled {
                pmg.monitor_mail_stats = false;
            }
        }
        if let Some(detection) = detection.filter(|d| d.is_cluster) {
            tracing::info!(
                cluster = %detection.cluster_name,
                endpoints = detection.endpoints.len(),
                "detected new Proxmox cluster, auto-discovering all nodes"
            );
            apply_cluster_detection(&mut record, detection);
        }

        let mut next = nodes.clone();
        let id = next.insert(record);
        let response = next
            .get(id)
            .map(|record| {
                let status = state.context.monitor.node_status(kind, &record.name);
                NodeResponse::from_record(id, record, status)
            })
            .ok_or_else(|| RegistryError::Internal("inserted record missing".to_string()))?;
        self.persist(&state, &mut nodes, next).await?;
        drop(nodes);

        tracing::info!(node = %response.name, host = %response.host, %kind, "added node");
        self.apply(&state).await?;
        self.broadcast(EventPayload::NodesUpdated {
            node_type: kind,
            action: "added".to_string(),
        });
        Ok(AddNodeOutcome::Created(response))
    }

    /// Updates the fields present in `request`. Absent fields keep their value.
    ///
    /// # Errors
    /// `Validation` for a malformed ID or bad input, `NotFound` for an unknown ID,
    /// `Conflict` when the new host is owned by another record.
    pub async fn update(
        &self,
        org: &OrgId,
        id: &str,
        request: NodeConfigRequest,
    ) -> RegistryResult<NodeResponse> {
        self.ensure_mutable()?;
        let id: NodeId = id.parse()?;
        let kind = id.kind();
        tracing::info!(node_id = %id, ?request, "update node request received");
        self.check_temperature_monitoring(request.temperature_monitoring_enabled)?;
        let host = NodeConfigRequest::present(&request.host)
            .map(|raw| NodeHost::parse(raw, kind))
            .transpose()?;

        let state = self.tenant(org).await?;
        let mut nodes = state.nodes.write().await;
        let mut next = nodes.clone();
        let record = next
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(format!("node {id}")))?;
        let old_name = record.name.clone();

        if let Some(name) = NodeConfigRequest::present(&request.name) {
            record.name = name.to_string();
        }
        if let Some(host) = host {
            if nodes.host_taken(kind, &host, Some(id)) {
                return Err(duplicate_host());
            }
            record.host = host;
        }
        if let Some(guest_url) = &request.guest_url {
            record.guest_url = guest_url.trim().to_string();
        }
        record.credentials = updated_credentials(kind, &record.credentials, &request)?;
        if let Some(fingerprint) = &request.fingerprint {
            let fingerprint = fingerprint.trim();
            record.fingerprint = (!fingerprint.is_empty()).then(|| fingerprint.to_string());
        }
        if let Some(verify_ssl) = request.verify_ssl {
            record.verify_ssl = verify_ssl;
        }
        if request.temperature_monitoring_enabled.is_some() {
            record.temperature_monitoring_enabled = request.temperature_monitoring_enabled;
        }
        apply_monitoring_flags(record, &request);
        let new_name = record.name.clone();

        let response = NodeResponse::from_record(
            id,
            record,
            state.context.monitor.node_status(kind, &new_name),
        );
        self.persist(&state, &mut nodes, next).await?;
        drop(nodes);

        self.sync_alert_overrides(&state, kind, &old_name, &new_name)
            .await;
        self.apply(&state).await?;
        self.refresh_discovery(&state).await;
        self.broadcast(EventPayload::NodesUpdated {
            node_type: kind,
            action: "updated".to_string(),
        });
        Ok(response)
    }

    /// # Errors
    /// `Validation` for a malformed ID, `NotFound` for an unknown one.
    pub async fn delete(&self, org: &OrgId, id: &str) -> RegistryResult<()> {
        self.ensure_mutable()?;
        let id: NodeId = id.parse()?;

        let state = self.tenant(org).await?;
        let mut nodes = state.nodes.write().await;
        let mut next = nodes.clone();
        let removed = next
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(format!("node {id}")))?;
        self.persist(&state, &mut nodes, next).await?;
        drop(nodes);

        tracing::info!(node = %removed.name, host = %removed.host, node_id = %id, "deleted node");
        self.recent.clear(org, id.kind(), &removed.name);
        self.apply(&state).await?;
        self.broadcast(EventPayload::NodeDeleted {
            node_type: id.kind(),
        });
        self.refresh_discovery(&state).await;
        Ok(())
    }

    /// Re-probes a PVE record and replaces its endpoint list, ignoring the cooldown.
    ///
    /// # Errors
    /// `InvalidKind` for PBS/PMG IDs, `NotFound` for unknown IDs, `NotClustered` when
    /// the node answers as standalone.
    pub async fn refresh_cluster(
        &self,
        org: &OrgId,
        id: &str,
    ) -> RegistryResult<ClusterRefreshResponse> {
        self.ensure_mutable()?;
        let id: NodeId = id.parse()?;
        if !id.kind().supports_clusters() {
            return Err(RegistryError::InvalidKind(
                "Only PVE nodes can be cluster members".to_string(),
            ));
        }

        let state = self.tenant(org).await?;
        let snapshot = state
            .nodes
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("node {id}")))?;
        let existing = snapshot
            .pve()
            .map(|pve| pve.cluster_endpoints.clone())
            .unwrap_or_default();

        let detection = self
            .probe
            .probe(&ClientConfig::from_record(&snapshot), "", &existing)
            .await;
        if !detection.is_cluster {
            return Err(RegistryError::NotClustered(
                "Node is not part of a cluster".to_string(),
            ));
        }
        if detection.endpoints.is_empty() {
            return Err(RegistryError::Internal(
                "Could not detect cluster nodes".to_string(),
            ));
        }

        let mut nodes = state.nodes.write().await;
        let id = nodes
            .find_by_host(NodeKind::Pve, &snapshot.host)
            .ok_or_else(|| RegistryError::NotFound(format!("node {id}")))?;
        if let Some(owner) = nodes.find_cluster(&detection.cluster_name) {
            if owner != id {
                return Err(RegistryError::Conflict(format!(
                    "Cluster '{}' is already configured on another node",
                    detection.cluster_name
                )));
            }
        }
        let mut next = nodes.clone();
        let record = next
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(format!("node {id}")))?;
        let old_node_count = existing.len();
        let new_node_count = detection.endpoints.len();
        apply_cluster_detection(record, detection);
        let response = ClusterRefreshResponse {
            status: "success",
            cluster_name: record.pve().map(|pve| pve.cluster_name.clone()).unwrap_or_default(),
            old_node_count,
            new_node_count,
            nodes_added: new_node_count as i64 - old_node_count as i64,
            cluster_nodes: record
                .pve()
                .map(|pve| pve.cluster_endpoints.clone())
                .unwrap_or_default(),
        };
        self.persist(&state, &mut nodes, next).await?;
        drop(nodes);

        tracing::info!(
            node = %snapshot.name,
            cluster = %response.cluster_name,
            old_endpoints = old_node_count,
            new_endpoints = new_node_count,
            "refreshed cluster membership"
        );
        if let Err(e) = state.context.monitor.reload().await {
            tracing::error!(error = %e, "failed to reload monitor after cluster refresh");
        }
        self.broadcast(EventPayload::NodesUpdated {
            node_type: NodeKind::Pve,
            action: "cluster_refresh".to_string(),
        });
        Ok(response)
    }

    pub(super) fn check_temperature_monitoring(&self, requested: Option<bool>) -> RegistryResult<()> {
        if requested == Some(true) && self.config.ssh_restricted() {
            return Err(ValidationError::field(
                "temperatureMonitoringEnabled",
                "Temperature monitoring requires SSH access, which is unavailable in containerized deployments",
            )
            .into());
        }
        Ok(())
    }

    /// Tries to swap a PBS password for a dedicated monitoring token.
    async fn mint_pbs_token(
        &self,
        host: &NodeHost,
        user: &str,
        password: &str,
    ) -> Option<MonitoringToken> {
        tracing::info!(%host, user, "attempting turnkey PBS token creation");
        let config = ClientConfig::new(host.as_str(), Credentials::password(user, password))
            .with_timeout(self.config.connection_test_timeout);
        let client = match self.clients.pbs(&config).await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(%host, error = %e, "failed to connect for token creation, keeping password auth");
                return None;
            }
        };

        let token_name = self.monitoring_token_name();
        match client.create_monitoring_token(&token_name).await {
            Ok(token) => {
                tracing::info!(%host, token_id = %token.token_id, "created PBS monitoring token");
                Some(token)
            }
            Err(e) => {
                tracing::warn!(%host, error = %e, "failed to create PBS token, keeping password auth");
                None
            }
        }
    }

    /// Keeps name-keyed alert overrides attached to a renamed node, then re-applies the
    /// stored alert configuration.
    async fn sync_alert_overrides(
        &self,
        state: &TenantState,
        kind: NodeKind,
        old_name: &str,
        new_name: &str,
    ) {
        let alerts = &state.context.alerts;
        let mut config = match alerts.load_alert_config().await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "failed to reload alert configuration after node update");
                return;
            }
        };

        if let (Some(from), Some(to)) = (
            AlertConfig::node_override_key(kind, old_name),
            AlertConfig::node_override_key(kind, new_name),
        ) {
            if config.rename_override(&from, &to) {
                tracing::info!(from = %from, to = %to, "migrated alert override to renamed node");
                if let Err(e) = alerts.save_alert_config(&config).await {
                    tracing::warn!(error = %e, "failed to save migrated alert override");
                }
            }
        }
        state.context.monitor.apply_alert_config(&config).await;
    }
}

fn duplicate_host() -> RegistryError {
    RegistryError::Conflict("A node with this host URL already exists".to_string())
}

/// Token auth wins when both token fields are given; otherwise user and password.
fn credentials_for_add(
    kind: NodeKind,
    request: &NodeConfigRequest,
) -> Result<Credentials, ValidationError> {
    let token_name = NodeConfigRequest::present(&request.token_name);
    let token_value = NodeConfigRequest::present(&request.token_value);
    if let (Some(token_id), Some(token_value)) = (token_name, token_value) {
        validate_username(token_id)?;
        return Ok(Credentials::token(token_id, token_value));
    }

    let user = NodeConfigRequest::present(&request.user);
    match (user, request.password.as_deref()) {
        (Some(user), Some(password)) if !password.is_empty() => {
            let user = normalize_username(user, kind);
            validate_username(&user)?;
            Ok(Credentials::password(user, password))
        }
        _ => Err(ValidationError::field(
            "credentials",
            "Authentication credentials required",
        )),
    }
}

/// Auth-mode switching on update.
///
/// Any token field switches to token auth and drops the password; a password switches
/// to password auth and drops the token; a bare user keeps the current secret.
fn updated_credentials(
    kind: NodeKind,
    current: &Credentials,
    request: &NodeConfigRequest,
) -> Result<Credentials, ValidationError> {
    if request.has_token_fields() {
        let (current_id, current_value) = match current {
            Credentials::Token {
                token_id,
                token_value,
            } => (Some(token_id.as_str()), Some(token_value.as_str())),
            Credentials::Password { .. } => (None, None),
        };
        let token_id = NodeConfigRequest::present(&request.token_name)
            .or(current_id)
            .ok_or_else(|| ValidationError::field("tokenName", "Token name is required"))?;
        let token_value = NodeConfigRequest::present(&request.token_value)
            .or(current_value)
            .ok_or_else(|| ValidationError::field("tokenValue", "Token value is required"))?;
        validate_username(token_id)?;
        return Ok(Credentials::token(token_id, token_value));
    }

    if request.has_password() {
        let user = NodeConfigRequest::present(&request.user)
            .or(current.user())
            .filter(|user| !user.is_empty())
            .ok_or_else(|| ValidationError::field("user", "User is required"))?;
        let user = normalize_username(user, kind);
        validate_username(&user)?;
        return Ok(Credentials::password(
            user,
            request.password.clone().unwrap_or_default(),
        ));
    }

    match current {
        Credentials::Password { user, password } => {
            let user = NodeConfigRequest::present(&request.user).unwrap_or(user.as_str());
            Ok(Credentials::password(
                normalize_username(user, kind),
                password.clone(),
            ))
        }
        Credentials::Token { .. } => Ok(current.clone()),
    }
}

/// Copies the monitoring switches present in `request` onto `record`.
fn apply_monitoring_flags(record: &mut NodeRecord, request: &NodeConfigRequest) {
    fn set(target: &mut bool, value: Option<bool>) {
        if let Some(value) = value {
            *target = value;
        }
    }

    match &mut record.details {
        NodeDetails::Pve(pve) => {
            set(&mut pve.monitor_vms, request.monitor_vms);
            set(&mut pve.monitor_containers, request.monitor_containers);
            set(&mut pve.monitor_storage, request.monitor_storage);
            set(&mut pve.monitor_backups, request.monitor_backups);
            if request.monitor_physical_disks.is_some() {
                pve.monitor_physical_disks = request.monitor_physical_disks;
            }
            if let Some(minutes) = request.physical_disk_polling_minutes {
                pve.physical_disk_polling_minutes = minutes;
            }
        }
        NodeDetails::Pbs(pbs) => {
            set(&mut pbs.monitor_backups, request.monitor_backups);
            set(&mut pbs.monitor_datastores, request.monitor_datastores);
            set(&mut pbs.monitor_sync_jobs, request.monitor_sync_jobs);
            set(&mut pbs.monitor_verify_jobs, request.monitor_verify_jobs);
            set(&mut pbs.monitor_prune_jobs, request.monitor_prune_jobs);
            set(&mut pbs.monitor_garbage_jobs, request.monitor_garbage_jobs);
            if let Some(excluded) = &request.exclude_datastores {
                pbs.exclude_datastores = excluded.clone();
            }
        }
        NodeDetails::Pmg(pmg) => {
            set(&mut pmg.monitor_mail_stats, request.monitor_mail_stats);
            set(&mut pmg.monitor_queues, request.monitor_queues);
            set(&mut pmg.monitor_quarantine, request.monitor_quarantine);
            set(&mut pmg.monitor_domain_stats, request.monitor_domain_stats);
        }
    }
}
