//! Fakes and builders shared by the engine scenario tests.

use crate::{
    core::{
        domain::{
            contract::{
                ClientFactory, EventBroadcaster, MockClusterProbe, MockFingerprintFetcher,
                NullMonitor, PbsApi, PmgApi, PveApi, TenantContext,
            },
            error::UpstreamError,
            model::{
                alert_config::AlertConfig,
                client_config::ClientConfig,
                cluster_detection::ClusterDetection,
                cluster_endpoint::ClusterEndpoint,
                events::{EventPayload, RegistryEvent},
                inventory::NodeInventory,
                node_list_item::NodeListItem,
                node_record::{Credentials, NodeRecord, NodeSource},
                proxmox_api::{
                    ClusterStatusEntry, Datastore, MonitoringToken, NodeNetworkInterface,
                    ProductVersion,
                },
            },
            value_object::{NodeHost, NodeKind, OrgId},
        },
        infrastructure::{
            memory_store::MemoryStore, static_tenants::StaticTenants,
            tls_fingerprint::format_fingerprint,
        },
    },
    config::RegistryConfig,
    registry::application::{
        request::auto_register_request::AutoRegisterRequest,
        service::registration_engine::{RegistrationEngine, RegistrationEngineBuilder},
    },
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::SystemTime;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

pub const AGENT_TOKEN: &str = "agent-report-token";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Client factory whose clients answer from canned data.
#[derive(Default)]
pub struct FakeProxmox {
    pub token_requests: AtomicUsize,
    pub fail_token_creation: bool,
    pub login_users: Mutex<Vec<String>>,
}

struct FakeClient {
    minted: Arc<FakeProxmox>,
}

#[async_trait]
impl ClientFactory for Arc<FakeProxmox> {
    async fn pve(&self, config: &ClientConfig) -> Result<Arc<dyn PveApi>, UpstreamError> {
        self.remember(config);
        Ok(Arc::new(FakeClient {
            minted: self.clone(),
        }))
    }

    async fn pbs(&self, config: &ClientConfig) -> Result<Arc<dyn PbsApi>, UpstreamError> {
        self.remember(config);
        Ok(Arc::new(FakeClient {
            minted: self.clone(),
        }))
    }

    async fn pmg(&self, config: &ClientConfig) -> Result<Arc<dyn PmgApi>, UpstreamError> {
        self.remember(config);
        Ok(Arc::new(FakeClient {
            minted: self.clone(),
        }))
    }
}

impl FakeProxmox {
    fn remember(&self, config: &ClientConfig) {
        if let Some(user) = config.credentials.user() {
            self.login_users.lock().push(user.to_string());
        }
    }

    fn mint(&self, realm: &str, token_name: &str) -> Result<MonitoringToken, UpstreamError> {
        self.token_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_token_creation {
            return Err(UpstreamError::Status {
                status: 403,
                message: "permission denied".into(),
            });
        }
        Ok(MonitoringToken {
            token_id: format!("pulse-monitor@{realm}!{token_name}"),
            token_value: "minted-secret".into(),
        })
    }
}

#[async_trait]
impl PveApi for FakeClient {
    async fn list_nodes(&self) -> Result<Vec<NodeListItem>, UpstreamError> {
        Ok(vec![NodeListItem {
            node: "pve1".into(),
            status: "online".into(),
            id: Some("node/pve1".into()),
            ssl_fingerprint: None,
        }])
    }

    async fn cluster_status(&self) -> Result<Vec<ClusterStatusEntry>, UpstreamError> {
        Ok(Vec::new())
    }

    async fn node_interfaces(
        &self,
        _node: &str,
    ) -> Result<Vec<NodeNetworkInterface>, UpstreamError> {
        Ok(Vec::new())
    }

    async fn version(&self) -> Result<ProductVersion, UpstreamError> {
        Ok(ProductVersion {
            version: "8.2.4".into(),
            ..Default::default()
        })
    }

    async fn create_monitoring_token(
        &self,
        token_name: &str,
    ) -> Result<MonitoringToken, UpstreamError> {
        self.minted.mint("pam", token_name)
    }
}

#[async_trait]
impl PbsApi for FakeClient {
    async fn version(&self) -> Result<ProductVersion, UpstreamError> {
        Ok(ProductVersion {
            version: "3.2.7".into(),
            ..Default::default()
        })
    }

    async fn datastores(&self) -> Result<Vec<Datastore>, UpstreamError> {
        Ok(vec![Datastore {
            store: "backup".into(),
            comment: None,
        }])
    }

    async fn create_monitoring_token(
        &self,
        token_name: &str,
    ) -> Result<MonitoringToken, UpstreamError> {
        self.minted.mint("pbs", token_name)
    }
}

#[async_trait]
impl PmgApi for FakeClient {
    async fn version(&self) -> Result<ProductVersion, UpstreamError> {
        Ok(ProductVersion {
            version: "8.1.2".into(),
            ..Default::default()
        })
    }
}

/// Collects every broadcast event.
#[derive(Default)]
pub struct RecordingBroadcaster {
    pub events: Mutex<Vec<RegistryEvent>>,
}

impl RecordingBroadcaster {
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .map(|event| match event.payload {
                EventPayload::NodeAutoRegistered { .. } => "node_auto_registered",
                EventPayload::NodeDeleted { .. } => "node_deleted",
                EventPayload::NodesUpdated { .. } => "nodes_updated",
                EventPayload::DiscoveryUpdate { .. } => "discovery_update",
            })
            .collect()
    }
}

impl EventBroadcaster for RecordingBroadcaster {
    fn broadcast(&self, event: RegistryEvent) {
        self.events.lock().push(event);
    }
}

/// An engine over a single in-memory tenant.
pub struct Harness {
    pub engine: Arc<RegistrationEngine>,
    pub store: Arc<MemoryStore>,
    pub clients: Arc<FakeProxmox>,
    pub events: Arc<RecordingBroadcaster>,
    pub org: OrgId,
}

impl Harness {
    pub fn stored(&self) -> NodeInventory {
        self.store.snapshot()
    }

    pub fn agent_request(&self, host: &str, name: &str, token_id: &str, secret: &str) -> AutoRegisterRequest {
        AutoRegisterRequest {
            node_type: "pve".into(),
            host: host.into(),
            token_id: token_id.into(),
            token_value: secret.into(),
            server_name: name.into(),
            auth_token: AGENT_TOKEN.into(),
            source: "agent".into(),
            ..Default::default()
        }
    }
}

pub struct HarnessBuilder {
    inventory: NodeInventory,
    alerts: AlertConfig,
    probe: MockClusterProbe,
    clients: FakeProxmox,
    config: RegistryConfig,
    customize: Option<Box<dyn FnOnce(RegistrationEngineBuilder) -> RegistrationEngineBuilder>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        let mut probe = MockClusterProbe::new();
        probe
            .expect_probe()
            .returning(|_, _, _| ClusterDetection::standalone());
        Self {
            inventory: NodeInventory::default(),
            alerts: AlertConfig::default(),
            probe,
            clients: FakeProxmox::default(),
            config: RegistryConfig::default(),
            customize: None,
        }
    }

    pub fn with_record(mut self, record: NodeRecord) -> Self {
        self.inventory.insert(record);
        self
    }

    pub fn with_alerts(mut self, alerts: AlertConfig) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_probe(mut self, probe: MockClusterProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn failing_token_creation(mut self) -> Self {
        self.clients.fail_token_creation = true;
        self
    }

    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn customize(
        mut self,
        f: impl FnOnce(RegistrationEngineBuilder) -> RegistrationEngineBuilder + 'static,
    ) -> Self {
        self.customize = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Harness {
        init_tracing();
        let store = Arc::new(MemoryStore::with_nodes(self.inventory).with_alerts(self.alerts));
        let tenants = StaticTenants::single(TenantContext::new(
            store.clone(),
            store.clone(),
            Arc::new(NullMonitor),
        ));
        let mut fingerprints = MockFingerprintFetcher::new();
        fingerprints
            .expect_fetch()
            .returning(|_| Ok("AA:BB:CC:DD".to_string()));
        let clients = Arc::new(self.clients);
        let events = Arc::new(RecordingBroadcaster::default());

        let mut builder = RegistrationEngine::builder()
            .tenants(Arc::new(tenants))
            .cluster_probe(Arc::new(self.probe))
            .client_factory(Arc::new(clients.clone()))
            .fingerprint_fetcher(Arc::new(fingerprints))
            .events(events.clone())
            .config(self.config);
        if let Some(customize) = self.customize {
            builder = customize(builder);
        }
        let engine = builder.build().unwrap();
        engine.api_tokens().register(
            AGENT_TOKEN,
            [crate::auth::application::service::api_token_service::SCOPE_HOST_AGENT_REPORT],
            None,
        );

        Harness {
            engine: Arc::new(engine),
            store,
            clients,
            events,
            org: OrgId::default(),
        }
    }
}

pub fn pve_record(name: &str, host: &str, token_id: &str) -> NodeRecord {
    NodeRecord::new(
        NodeKind::Pve,
        name,
        NodeHost::parse(host, NodeKind::Pve).unwrap(),
        Credentials::token(token_id, "old-secret"),
    )
}

pub fn agent_record(name: &str, host: &str, token_id: &str) -> NodeRecord {
    NodeRecord {
        source: NodeSource::Agent,
        ..pve_record(name, host, token_id)
    }
}

pub fn endpoint(name: &str, ip: &str) -> ClusterEndpoint {
    ClusterEndpoint {
        node_id: format!("node/{name}"),
        node_name: name.into(),
        host: format!("https://{ip}:8006"),
        guest_url: String::new(),
        ip: ip.into(),
        ip_override: String::new(),
        fingerprint: String::new(),
        online: true,
        last_seen: SystemTime::now(),
    }
}

pub fn cluster_record(name: &str, host: &str, cluster: &str, endpoints: Vec<ClusterEndpoint>) -> NodeRecord {
    let mut record = pve_record(name, host, "pulse-monitor@pam!pulse-1");
    if let Some(pve) = record.pve_mut() {
        pve.is_cluster = true;
        pve.cluster_name = cluster.into();
        pve.cluster_endpoints = endpoints;
    }
    record
}

/// HTTPS endpoint behind a fresh self-signed certificate, the way a stock Proxmox
/// install ships. Answers `GET` on each route with `{"data": ...}` and 404 otherwise.
pub struct SelfSignedServer {
    pub addr: SocketAddr,
    pub fingerprint: String,
}

impl SelfSignedServer {
    pub async fn start(routes: &[(&str, serde_json::Value)]) -> Self {
        Self::start_on("127.0.0.1:0", routes).await
    }

    pub async fn start_on(bind: &str, routes: &[(&str, serde_json::Value)]) -> Self {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["pve.local".to_string()]).unwrap();
        let cert_der = cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key)
        .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let routes: Arc<HashMap<String, String>> = Arc::new(
            routes
                .iter()
                .map(|(path, data)| {
                    (
                        format!("/api2/json/{path}"),
                        serde_json::json!({ "data": data }).to_string(),
                    )
                })
                .collect(),
        );
        let listener = TcpListener::bind(bind).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                let routes = routes.clone();
                tokio::spawn(async move {
                    let Ok(mut tls) = acceptor.accept(stream).await else {
                        return;
                    };
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
                        match tls.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    let request = String::from_utf8_lossy(&head);
                    let path = request.split_whitespace().nth(1).unwrap_or("/");
                    let (status, body) = match routes.get(path) {
                        Some(body) => ("200 OK", body.as_str()),
                        None => ("404 Not Found", ""),
                    };
                    let response = format!(
                        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = tls.write_all(response.as_bytes()).await;
                    let _ = tls.shutdown().await;
                });
            }
        });

        Self {
            addr,
            fingerprint: format_fingerprint(&cert_der),
        }
    }

    pub fn url(&self) -> String {
        format!("https://{}", self.addr)
    }
}
