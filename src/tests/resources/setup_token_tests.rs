use super::support::{HarnessBuilder, init_tracing};
use crate::{
    core::{
        domain::{
            contract::{MockClusterProbe, MockFingerprintFetcher, NullMonitor, TenantContext},
            error::{RegistryError, UnauthorizedReason},
            model::cluster_detection::ClusterDetection,
            value_object::OrgId,
        },
        infrastructure::{memory_store::MemoryStore, static_tenants::StaticTenants},
    },
    registry::application::{
        request::setup_url_request::SetupUrlRequest,
        response::auto_register_response::AutoRegisterOutcome,
        service::{admission::AutoRegisterCall, registration_engine::RegistrationEngine},
    },
};
use std::sync::Arc;
use std::time::Duration;

fn body(kind: &str, host: &str, setup_code: &str) -> String {
    serde_json::json!({
        "type": kind,
        "host": host,
        "serverName": "node",
        "tokenId": "pulse-monitor@pam!pulse-1",
        "tokenValue": "value",
        "setupCode": setup_code
    })
    .to_string()
}

async fn register(
    engine: &RegistrationEngine,
    org: &OrgId,
    body: &str,
) -> Result<AutoRegisterOutcome, RegistryError> {
    engine
        .admit_auto_register(AutoRegisterCall {
            body: body.as_bytes(),
            api_token: None,
            peer: Some("192.0.2.10".parse().unwrap()),
            forwarded_for: None,
            org: org.clone(),
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn test_setup_token_replay_window() {
    let h = HarnessBuilder::new().build();
    let issued = h
        .engine
        .issue_setup_url(
            &h.org,
            &SetupUrlRequest {
                node_type: "pve".into(),
                host: "10.0.0.1".into(),
                backup_perms: false,
            },
            "http://pulse.lan:7655",
        )
        .unwrap();
    let token = issued.setup_token;

    register(&h.engine, &h.org, &body("pve", "10.0.0.1", &token))
        .await
        .unwrap();
    register(&h.engine, &h.org, &body("pve", "10.0.0.1", &token))
        .await
        .unwrap();
    assert_eq!(h.stored().pve.len(), 1);

    tokio::time::advance(Duration::from_secs(90)).await;
    let err = register(&h.engine, &h.org, &body("pve", "10.0.0.1", &token))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Unauthorized(UnauthorizedReason::Invalid)
    ));
}

#[tokio::test]
async fn test_setup_token_kind_mismatch_leaves_token_usable() {
    let h = HarnessBuilder::new().build();
    let issued = h
        .engine
        .issue_setup_url(
            &h.org,
            &SetupUrlRequest {
                node_type: "pve".into(),
                host: String::new(),
                backup_perms: false,
            },
            "http://pulse.lan:7655",
        )
        .unwrap();

    let err = register(&h.engine, &h.org, &body("pbs", "10.0.0.9", &issued.setup_token))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Unauthorized(_)));
    assert!(h.stored().is_empty());
    assert!(h.engine.setup_tokens().peek(&issued.setup_token));

    register(&h.engine, &h.org, &body("pve", "10.0.0.1", &issued.setup_token))
        .await
        .unwrap();
    assert_eq!(h.stored().pve.len(), 1);
}

#[tokio::test]
async fn test_setup_token_carries_organization() {
    init_tracing();
    let acme = OrgId::new("acme");
    let default_store = Arc::new(MemoryStore::new());
    let acme_store = Arc::new(MemoryStore::new());
    let tenants = StaticTenants::single(TenantContext::new(
        default_store.clone(),
        default_store.clone(),
        Arc::new(NullMonitor),
    ))
    .with_tenant(
        acme.clone(),
        TenantContext::new(acme_store.clone(), acme_store.clone(), Arc::new(NullMonitor)),
    );

    let mut probe = MockClusterProbe::new();
    probe
        .expect_probe()
        .returning(|_, _, _| ClusterDetection::standalone());
    let mut fingerprints = MockFingerprintFetcher::new();
    fingerprints
        .expect_fetch()
        .returning(|_| Ok("AA:BB".to_string()));
    let engine = RegistrationEngine::builder()
        .tenants(Arc::new(tenants))
        .cluster_probe(Arc::new(probe))
        .fingerprint_fetcher(Arc::new(fingerprints))
        .build()
        .unwrap();

    let issued = engine
        .issue_setup_url(
            &acme,
            &SetupUrlRequest {
                node_type: "pbs".into(),
                host: "10.1.0.5".into(),
                backup_perms: true,
            },
            "https://pulse.example.com",
        )
        .unwrap();
    assert!(issued.url.contains("backup_perms=true"));

    register(&engine, &OrgId::default(), &body("pbs", "10.1.0.5", &issued.setup_token))
        .await
        .unwrap();
    assert!(default_store.snapshot().is_empty());
    assert_eq!(acme_store.snapshot().pbs.len(), 1);
    assert_eq!(
        acme_store.snapshot().pbs[0].host.as_str(),
        "https://10.1.0.5:8007"
    );
}

#[tokio::test]
async fn test_malformed_body_is_rejected_before_auth() {
    let h = HarnessBuilder::new().build();
    let err = register(&h.engine, &h.org, "{not json").await.unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
    assert_eq!(err.status_code(), 400);
}
