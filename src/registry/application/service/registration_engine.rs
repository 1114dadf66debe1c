//! The registration engine: owner of every node inventory mutation.

use crate::{
    auth::application::service::{
        api_token_service::ApiTokenRegistry, setup_token_service::SetupTokenStore,
    },
    config::{ApiClientConfig, ProbeSettings, RegistryConfig},
    core::{
        domain::{
            contract::{
                ClientFactory, ClusterProbe, EventBroadcaster, FingerprintFetcher, HostResolver,
                NodeStatus, NullBroadcaster, TenantContext, TenantProvider,
            },
            error::{RegistryError, RegistryResult, ValidationError},
            model::{
                client_config::ClientConfig,
                cluster_detection::{ClusterDetection, is_placeholder_cluster_name},
                cluster_endpoint::ClusterEndpoint,
                events::{EventPayload, RegistryEvent},
                inventory::NodeInventory,
                node_record::NodeRecord,
            },
            value_object::{NodeKind, OrgId},
        },
        infrastructure::{
            dns_resolver::DnsResolver, proxmox_clients::HttpClientFactory,
            tls_fingerprint::TlsFingerprintFetcher,
        },
    },
    registry::application::{
        response::node_response::NodeResponse,
        service::{
            cluster_probe::{PveClusterProbe, should_skip_cluster_detection},
            probe_cooldown::ProbeCooldown,
            recent_registrations::RecentRegistrations,
        },
    },
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, RwLock};

/// One organization's collaborators and its in-memory inventory.
///
/// `nodes` mirrors the last successful save. Writers hold its write lock across
/// read, decide, persist and swap, so dedup decisions always see a consistent list.
pub(super) struct TenantState {
    pub(super) context: TenantContext,
    pub(super) nodes: RwLock<NodeInventory>,
}

/// Adds, updates, deletes and auto-registers Proxmox nodes.
///
/// Every operation takes the organization explicitly. The inventory of an organization
/// is loaded from its store on first use and kept in memory afterwards; the store is
/// written before the in-memory copy changes, so a failed save leaves both untouched.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use pulse_registry::{
///     JsonFileStore, NullMonitor, OrgId, RegistrationEngine, RegistryResult, StaticTenants,
///     TenantContext,
/// };
///
/// #[tokio::main]
/// async fn main() -> RegistryResult<()> {
///     let store = Arc::new(JsonFileStore::new("/etc/pulse"));
///     let tenants = StaticTenants::single(TenantContext::new(
///         store.clone(),
///         store,
///         Arc::new(NullMonitor),
///     ));
///     let engine = RegistrationEngine::builder()
///         .tenants(Arc::new(tenants))
///         .build()?;
///
///     for node in engine.list(&OrgId::default()).await? {
///         println!("{} {}", node.id, node.host);
///     }
///     Ok(())
/// }
/// ```
pub struct RegistrationEngine {
    pub(super) tenants: Arc<dyn TenantProvider>,
    pub(super) states: Mutex<HashMap<OrgId, Arc<TenantState>>>,
    pub(super) probe: Arc<dyn ClusterProbe>,
    pub(super) clients: Arc<dyn ClientFactory>,
    pub(super) fingerprints: Arc<dyn FingerprintFetcher>,
    pub(super) resolver: Arc<dyn HostResolver>,
    pub(super) setup_tokens: Arc<SetupTokenStore>,
    pub(super) api_tokens: Arc<ApiTokenRegistry>,
    pub(super) recent: RecentRegistrations,
    pub(super) cooldown: ProbeCooldown,
    pub(super) events: Arc<dyn EventBroadcaster>,
    pub(super) config: RegistryConfig,
}

/// Builder for [`RegistrationEngine`]. Only the tenant provider is required; every other
/// collaborator defaults to the network-backed implementation.
#[derive(Default)]
pub struct RegistrationEngineBuilder {
    tenants: Option<Arc<dyn TenantProvider>>,
    probe: Option<Arc<dyn ClusterProbe>>,
    clients: Option<Arc<dyn ClientFactory>>,
    fingerprints: Option<Arc<dyn FingerprintFetcher>>,
    resolver: Option<Arc<dyn HostResolver>>,
    setup_tokens: Option<Arc<SetupTokenStore>>,
    api_tokens: Option<Arc<ApiTokenRegistry>>,
    events: Option<Arc<dyn EventBroadcaster>>,
    config: RegistryConfig,
    probe_settings: ProbeSettings,
    client_settings: ApiClientConfig,
}

impl RegistrationEngineBuilder {
    pub fn tenants(mut self, tenants: Arc<dyn TenantProvider>) -> Self {
        self.tenants = Some(tenants);
        self
    }

    pub fn cluster_probe(mut self, probe: Arc<dyn ClusterProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn client_factory(mut self, clients: Arc<dyn ClientFactory>) -> Self {
        self.clients = Some(clients);
        self
    }

    pub fn fingerprint_fetcher(mut self, fingerprints: Arc<dyn FingerprintFetcher>) -> Self {
        self.fingerprints = Some(fingerprints);
        self
    }

    pub fn host_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn setup_tokens(mut self, store: Arc<SetupTokenStore>) -> Self {
        self.setup_tokens = Some(store);
        self
    }

    pub fn api_tokens(mut self, registry: Arc<ApiTokenRegistry>) -> Self {
        self.api_tokens = Some(registry);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventBroadcaster>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn probe_settings(mut self, settings: ProbeSettings) -> Self {
        self.probe_settings = settings;
        self
    }

    pub fn client_settings(mut self, settings: ApiClientConfig) -> Self {
        self.client_settings = settings;
        self
    }

    /// # Errors
    /// `RegistryError::Validation` when no tenant provider was given.
    pub fn build(self) -> RegistryResult<RegistrationEngine> {
        let tenants = self.tenants.ok_or_else(|| {
            RegistryError::Validation(ValidationError::field(
                "tenants",
                "Tenant provider is required",
            ))
        })?;

        let fingerprints = self
            .fingerprints
            .unwrap_or_else(|| Arc::new(TlsFingerprintFetcher::default()));
        let clients = self.clients.unwrap_or_else(|| {
            Arc::new(HttpClientFactory::new(self.client_settings.clone()))
        });
        let probe = self.probe.unwrap_or_else(|| {
            Arc::new(PveClusterProbe::new(
                clients.clone(),
                fingerprints.clone(),
                self.probe_settings.clone(),
            ))
        });
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(DnsResolver::new(self.probe_settings.dns_timeout)));
        let setup_tokens = self.setup_tokens.unwrap_or_else(|| {
            Arc::new(SetupTokenStore::new(
                self.config.setup_token_ttl,
                self.config.setup_token_grace,
            ))
        });

        Ok(RegistrationEngine {
            tenants,
            states: Mutex::new(HashMap::new()),
            probe,
            clients,
            fingerprints,
            resolver,
            setup_tokens,
            api_tokens: self.api_tokens.unwrap_or_default(),
            recent: RecentRegistrations::new(self.config.recent_registration_ttl),
            cooldown: ProbeCooldown::new(self.probe_settings.cooldown),
            events: self.events.unwrap_or_else(|| Arc::new(NullBroadcaster)),
            config: self.config,
        })
    }
}

impl RegistrationEngine {
    pub fn builder() -> RegistrationEngineBuilder {
        RegistrationEngineBuilder::default()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn setup_tokens(&self) -> &Arc<SetupTokenStore> {
        &self.setup_tokens
    }

    pub fn api_tokens(&self) -> &Arc<ApiTokenRegistry> {
        &self.api_tokens
    }

    /// Every record of `org` with secrets redacted.
    ///
    /// PVE records whose cluster metadata is missing or a placeholder are re-probed
    /// first, at most once per cooldown period per host.
    pub async fn list(&self, org: &OrgId) -> RegistryResult<Vec<NodeResponse>> {
        let state = self.tenant(org).await?;
        self.refresh_stale_clusters(org, &state).await;

        let nodes = state.nodes.read().await;
        Ok(nodes
            .iter()
            .map(|(id, record)| {
                let status = self.status_of(org, &state, record);
                NodeResponse::from_record(id, record, status)
            })
            .collect())
    }

    fn status_of(&self, org: &OrgId, state: &TenantState, record: &NodeRecord) -> NodeStatus {
        if self.recent.is_recent(org, record.kind(), &record.name) {
            return NodeStatus::Connected;
        }
        state.context.monitor.node_status(record.kind(), &record.name)
    }

    async fn refresh_stale_clusters(&self, org: &OrgId, state: &TenantState) {
        let candidates: Vec<NodeRecord> = {
            let nodes = state.nodes.read().await;
            nodes
                .nodes(NodeKind::Pve)
                .iter()
                .filter(|record| record.needs_cluster_refresh())
                .filter(|record| record.credentials.has_token() || record.credentials.has_password())
                .filter(|record| !should_skip_cluster_detection(record.host.as_str(), &record.name))
                .cloned()
                .collect()
        };

        let mut changed = false;
        for record in candidates {
            if !self.cooldown.try_begin(&format!("{org}/{}", record.host)) {
                continue;
            }
            let existing = record
                .pve()
                .map(|pve| pve.cluster_endpoints.clone())
                .unwrap_or_default();
            let detection = self
                .probe
                .probe(&ClientConfig::from_record(&record), &record.name, &existing)
                .await;
            if !detection.is_mergeable() || detection.endpoints.is_empty() {
                continue;
            }

            let mut nodes = state.nodes.write().await;
            let Some(id) = nodes.find_by_host(NodeKind::Pve, &record.host) else {
                continue;
            };
            if let Some(owner) = nodes.find_cluster(&detection.cluster_name) {
                if owner != id {
                    tracing::debug!(
                        cluster = %detection.cluster_name,
                        node = %record.name,
                        "cluster already represented by another record, leaving stale metadata"
                    );
                    continue;
                }
            }
            let mut next = nodes.clone();
            let Some(target) = next.get_mut(id) else {
                continue;
            };
            if !target.needs_cluster_refresh() {
                continue;
            }
            apply_cluster_detection(target, detection);
            match self.persist(state, &mut nodes, next).await {
                Ok(()) => {
                    tracing::info!(node = %record.name, "refreshed stale cluster metadata");
                    changed = true;
                }
                Err(e) => tracing::warn!(node = %record.name, error = %e, "failed to save refreshed cluster metadata"),
            }
        }

        if changed {
            if let Err(e) = state.context.monitor.reload().await {
                tracing::warn!(error = %e, "failed to reload monitor after cluster refresh");
            }
        }
    }

    /// State of `org`, loading its inventory on first use.
    pub(super) async fn tenant(&self, org: &OrgId) -> RegistryResult<Arc<TenantState>> {
        let mut states = self.states.lock().await;
        if let Some(state) = states.get(org) {
            return Ok(state.clone());
        }

        let context = self.tenants.resolve(org).await?;
        let inventory = context.store.load_nodes().await?;
        tracing::debug!(org_id = %org, nodes = inventory.len(), "loaded node inventory");
        let state = Arc::new(TenantState {
            context,
            nodes: RwLock::new(inventory),
        });
        states.insert(org.clone(), state.clone());
        Ok(state)
    }

    /// Saves `next` and makes it the current inventory. On failure `current` is untouched.
    pub(super) async fn persist(
        &self,
        state: &TenantState,
        current: &mut NodeInventory,
        next: NodeInventory,
    ) -> RegistryResult<()> {
        if let Err(e) = state.context.store.save_nodes(&next).await {
            tracing::error!(error = %e, "failed to save nodes configuration");
            return Err(e);
        }
        *current = next;
        Ok(())
    }

    /// Asks the monitor to pick up a saved change.
    pub(super) async fn apply(&self, state: &TenantState) -> RegistryResult<()> {
        state.context.monitor.reload().await.map_err(|e| {
            tracing::error!(error = %e, "failed to reload monitor");
            RegistryError::Internal("Configuration saved but failed to apply changes".to_string())
        })
    }

    pub(super) fn broadcast(&self, payload: EventPayload) {
        self.events.broadcast(RegistryEvent::now(payload));
    }

    /// Refreshes the discovery cache and forwards the result to subscribers.
    pub(super) async fn refresh_discovery(&self, state: &TenantState) {
        if let Some(servers) = state.context.monitor.refresh_discovery().await {
            self.broadcast(EventPayload::DiscoveryUpdate { servers });
        }
    }

    /// `pulse-<instance>-<unix seconds>`, unique per registry instance and second.
    pub(super) fn monitoring_token_name(&self) -> String {
        let unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        format!("pulse-{}-{}", self.config.instance_name, unix)
    }

    pub(super) fn ensure_mutable(&self) -> RegistryResult<()> {
        if self.config.mock_mode {
            return Err(RegistryError::Forbidden(
                "Cannot modify nodes in mock mode".to_string(),
            ));
        }
        Ok(())
    }

    /// Runs the probe for a PVE record unless its host is a known test fixture.
    pub(super) async fn detect_cluster(
        &self,
        config: &ClientConfig,
        name: &str,
        existing: &[ClusterEndpoint],
    ) -> ClusterDetection {
        if should_skip_cluster_detection(&config.host, name) {
            tracing::debug!(host = %config.host, node = name, "skipping cluster detection");
            return ClusterDetection::standalone();
        }
        self.probe.probe(config, name, existing).await
    }
}

impl std::fmt::Debug for RegistrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Writes a probe result into a PVE record. A placeholder name never replaces a real one.
pub(super) fn apply_cluster_detection(record: &mut NodeRecord, detection: ClusterDetection) {
    let Some(pve) = record.pve_mut() else {
        return;
    };
    if !is_placeholder_cluster_name(&detection.cluster_name)
        || is_placeholder_cluster_name(&pve.cluster_name)
    {
        pve.cluster_name = detection.cluster_name;
    }
    pve.is_cluster = detection.is_cluster;
    pve.cluster_endpoints = detection.endpoints;
}

/// Appends the endpoints whose node name is not yet known. Returns how many were added.
pub(super) fn merge_endpoints(record: &mut NodeRecord, endpoints: Vec<ClusterEndpoint>) -> usize {
    let Some(pve) = record.pve_mut() else {
        return 0;
    };
    let mut added = 0;
    for endpoint in endpoints {
        if pve
            .cluster_endpoints
            .iter()
            .any(|known| known.node_name == endpoint.node_name)
        {
            continue;
        }
        tracing::info!(cluster = %pve.cluster_name, endpoint = %endpoint.node_name, "added new endpoint to existing cluster");
        pve.cluster_endpoints.push(endpoint);
        added += 1;
    }
    added
}
