use super::support::{HarnessBuilder, SelfSignedServer, cluster_record, endpoint, init_tracing};
use crate::{
    config::ProbeSettings,
    core::{
        domain::{
            contract::{ClientFactory, ClusterProbe},
            error::{TlsFailure, UpstreamError},
            model::{client_config::ClientConfig, node_record::Credentials},
        },
        infrastructure::{
            proxmox_clients::HttpClientFactory, tls_fingerprint::TlsFingerprintFetcher,
        },
    },
    registry::application::{
        response::auto_register_response::AutoRegisterOutcome,
        service::cluster_probe::PveClusterProbe,
    },
};
use std::sync::Arc;
use std::time::Duration;

fn verified_config(url: String) -> ClientConfig {
    ClientConfig {
        verify_ssl: true,
        ..ClientConfig::new(url, Credentials::token("pulse-monitor@pam!pulse-1", "secret"))
    }
}

fn cluster_status() -> serde_json::Value {
    serde_json::json!([
        {"type": "cluster", "name": "alpha"},
        {"type": "node", "id": "node/pve1", "name": "pve1", "ip": "127.0.0.1", "online": 1},
        {"type": "node", "id": "node/pve2", "name": "pve2", "ip": "127.0.0.2", "online": 1}
    ])
}

fn live_probe() -> PveClusterProbe {
    PveClusterProbe::new(
        Arc::new(HttpClientFactory::default()),
        Arc::new(TlsFingerprintFetcher::default()),
        ProbeSettings {
            status_attempts: 1,
            backoff_unit: Duration::from_millis(10),
            validation_timeout: Duration::from_secs(2),
            ..ProbeSettings::default()
        },
    )
}

#[tokio::test]
async fn test_pinned_fingerprint_trusts_self_signed_certificate() {
    init_tracing();
    let server = SelfSignedServer::start(&[("nodes", serde_json::json!([]))]).await;

    let config = verified_config(server.url()).with_fingerprint(Some(server.fingerprint.clone()));
    let client = HttpClientFactory::default().pve(&config).await.unwrap();
    assert!(client.list_nodes().await.unwrap().is_empty());

    let compact = server.fingerprint.replace(':', "").to_lowercase();
    let config = verified_config(server.url()).with_fingerprint(Some(compact));
    let client = HttpClientFactory::default().pve(&config).await.unwrap();
    assert!(client.list_nodes().await.is_ok());
}

#[tokio::test]
async fn test_changed_certificate_is_a_fingerprint_mismatch() {
    init_tracing();
    let server = SelfSignedServer::start(&[("nodes", serde_json::json!([]))]).await;
    let stale = "AA:".repeat(31) + "AA";

    let config = verified_config(server.url()).with_fingerprint(Some(stale.clone()));
    let client = HttpClientFactory::default().pve(&config).await.unwrap();
    let err = client.list_nodes().await.unwrap_err();
    assert!(err.is_tls_mismatch());
    assert_eq!(
        err,
        UpstreamError::Tls(TlsFailure::FingerprintMismatch {
            expected: stale,
            actual: server.fingerprint.clone(),
        })
    );
}

#[tokio::test]
async fn test_untrusted_chain_is_a_tls_failure() {
    init_tracing();
    let server = SelfSignedServer::start(&[("nodes", serde_json::json!([]))]).await;

    let client = HttpClientFactory::default()
        .pve(&verified_config(server.url()))
        .await
        .unwrap();
    let err = client.list_nodes().await.unwrap_err();
    assert!(
        matches!(err, UpstreamError::Tls(TlsFailure::Certificate(_))),
        "unexpected error: {err:?}"
    );

    let relaxed = verified_config(server.url()).relaxed();
    let client = HttpClientFactory::default().pve(&relaxed).await.unwrap();
    assert!(client.list_nodes().await.is_ok());
}

#[tokio::test]
async fn test_pinned_cluster_detection_relaxes_for_peers() {
    init_tracing();
    let primary = SelfSignedServer::start(&[
        ("cluster/status", cluster_status()),
        ("nodes", serde_json::json!([{"node": "pve1", "status": "online"}])),
    ])
    .await;
    // Second member on the same port with its own certificate.
    let peer = SelfSignedServer::start_on(
        &format!("127.0.0.2:{}", primary.addr.port()),
        &[("nodes", serde_json::json!([{"node": "pve2", "status": "online"}]))],
    )
    .await;

    let config =
        verified_config(primary.url()).with_fingerprint(Some(primary.fingerprint.clone()));
    let detection = live_probe().probe(&config, "pve1", &[]).await;

    assert!(detection.is_cluster);
    assert_eq!(detection.cluster_name, "alpha");
    let names: Vec<&str> = detection
        .endpoints
        .iter()
        .map(|e| e.node_name.as_str())
        .collect();
    assert_eq!(names, ["pve1", "pve2"]);
    assert_eq!(detection.endpoints[0].fingerprint, primary.fingerprint);
    assert_eq!(detection.endpoints[1].fingerprint, peer.fingerprint);
}

#[tokio::test]
async fn test_agent_on_self_signed_member_merges_into_cluster() {
    let server = SelfSignedServer::start(&[
        ("cluster/status", cluster_status()),
        ("nodes", serde_json::json!([{"node": "pve1", "status": "online"}])),
    ])
    .await;

    let h = HarnessBuilder::new()
        .with_record(cluster_record(
            "alpha-main",
            "https://10.0.0.1:8006",
            "alpha",
            vec![endpoint("pve9", "10.0.0.1")],
        ))
        .customize(|builder| {
            builder
                .cluster_probe(Arc::new(live_probe()))
                .fingerprint_fetcher(Arc::new(TlsFingerprintFetcher::default()))
        })
        .build();

    let request = h.agent_request(
        &server.url(),
        "pve1",
        "pulse-monitor@pam!pulse-pve1",
        "secret",
    );
    let outcome = h.engine.auto_register(&h.org, request).await.unwrap();

    let AutoRegisterOutcome::Merged(merge) = &outcome else {
        panic!("expected a cluster merge, got {outcome:?}");
    };
    assert_eq!(merge.cluster, "alpha");
    assert_eq!(merge.existing_node, "alpha-main");

    let stored = h.stored();
    assert_eq!(stored.pve.len(), 1);
    let endpoints = &stored.pve[0].pve().unwrap().cluster_endpoints;
    assert!(endpoints.iter().any(|e| e.node_name == "pve1"));
}
