use super::support::{
    AGENT_TOKEN, HarnessBuilder, agent_record, cluster_record, endpoint, pve_record,
};
use crate::{
    core::domain::{
        contract::{MockClusterProbe, MockHostResolver, NodeStatus},
        error::{RegistryError, UnauthorizedReason},
        model::{
            cluster_detection::ClusterDetection,
            events::EventPayload,
            node_record::{Credentials, NodeDetails, NodeSource},
        },
        value_object::NodeKind,
    },
    registry::application::{
        request::{
            auto_register_request::AutoRegisterRequest, node_config_request::NodeConfigRequest,
        },
        response::{add_node_response::AddNodeOutcome, auto_register_response::AutoRegisterOutcome},
        service::admission::AutoRegisterCall,
    },
};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::{Arc, atomic::Ordering};

fn add_request(kind: &str, name: &str, host: &str) -> NodeConfigRequest {
    NodeConfigRequest {
        node_type: Some(kind.into()),
        name: Some(name.into()),
        host: Some(host.into()),
        token_name: Some("pulse-monitor@pam!pulse".into()),
        token_value: Some("secret".into()),
        ..Default::default()
    }
}

fn secret_of(credentials: &Credentials) -> &str {
    match credentials {
        Credentials::Token { token_value, .. } => token_value,
        Credentials::Password { password, .. } => password,
    }
}

#[tokio::test]
async fn test_single_pve_node_is_normalized() {
    let h = HarnessBuilder::new().build();
    let request = NodeConfigRequest {
        node_type: Some("pve".into()),
        name: Some("px1".into()),
        host: Some("10.0.0.1".into()),
        user: Some("root@pam".into()),
        password: Some("x".into()),
        ..Default::default()
    };

    let outcome = h.engine.add(&h.org, request).await.unwrap();
    assert!(matches!(outcome, AddNodeOutcome::Created(_)));

    let stored = h.stored();
    assert_eq!(stored.pve.len(), 1);
    assert_eq!(stored.pve[0].host.as_str(), "https://10.0.0.1:8006");
    assert_eq!(stored.pve[0].credentials.user(), Some("root@pam"));
    assert_eq!(h.events.kinds(), vec!["nodes_updated"]);
}

#[tokio::test]
async fn test_duplicate_host_is_rejected() {
    let h = HarnessBuilder::new()
        .with_record(pve_record("existing", "https://10.0.0.1:8006", "pulse-monitor@pam!a"))
        .build();

    let err = h
        .engine
        .add(&h.org, add_request("pve", "other", "10.0.0.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Conflict(_)));
    assert_eq!(err.status_code(), 409);
    assert_eq!(h.stored().pve.len(), 1);
    assert_eq!(h.store.save_count(), 0);
}

#[tokio::test]
async fn test_same_hostname_on_different_host_gets_disambiguated() {
    let h = HarnessBuilder::new()
        .with_record(pve_record("px1", "https://10.0.1.100:8006", "pulse-monitor@pam!other"))
        .build();

    let request = h.agent_request(
        "https://10.0.2.224:8006",
        "px1",
        "pulse-monitor@pam!pulse-1",
        "fresh",
    );
    let outcome = h.engine.auto_register(&h.org, request).await.unwrap();
    assert!(!outcome.is_merged());

    let stored = h.stored();
    assert_eq!(stored.pve.len(), 2);
    assert_eq!(stored.pve[0].name, "px1");
    assert_eq!(stored.pve[1].name, "px1 (10.0.2.224)");
    assert_eq!(stored.pve[1].source, NodeSource::Agent);
}

#[tokio::test]
async fn test_dhcp_change_moves_the_record() {
    let h = HarnessBuilder::new()
        .with_record(pve_record("pve", "https://10.0.1.100:8006", "pulse-monitor@pam!pulse-1"))
        .build();

    let request = AutoRegisterRequest {
        source: "script".into(),
        ..h.agent_request(
            "https://10.0.1.200:8006",
            "pve",
            "pulse-monitor@pam!pulse-1",
            "rotated",
        )
    };
    h.engine.auto_register(&h.org, request).await.unwrap();

    let stored = h.stored();
    assert_eq!(stored.pve.len(), 1);
    assert_eq!(stored.pve[0].host.as_str(), "https://10.0.1.200:8006");
    assert_eq!(secret_of(&stored.pve[0].credentials), "rotated");
}

#[tokio::test]
async fn test_agent_keeps_operator_hostname() {
    let mut resolver = MockHostResolver::new();
    resolver
        .expect_resolve()
        .withf(|host| host == "https://pve.example.com:8006")
        .returning(|_| Some("192.168.1.100".parse::<IpAddr>().unwrap()));

    let h = HarnessBuilder::new()
        .with_record(agent_record(
            "pve01",
            "https://pve.example.com:8006",
            "pulse-monitor@pam!pulse-old",
        ))
        .customize(move |builder| builder.host_resolver(Arc::new(resolver)))
        .build();

    let request = h.agent_request(
        "https://192.168.1.100:8006",
        "pve01",
        "pulse-monitor@pam!pulse-new",
        "rotated",
    );
    h.engine.auto_register(&h.org, request).await.unwrap();

    let stored = h.stored();
    assert_eq!(stored.pve.len(), 1);
    assert_eq!(stored.pve[0].host.as_str(), "https://pve.example.com:8006");
    assert_eq!(
        stored.pve[0].credentials.token_id(),
        Some("pulse-monitor@pam!pulse-new")
    );
    assert_eq!(secret_of(&stored.pve[0].credentials), "rotated");
}

#[tokio::test]
async fn test_auto_register_event_carries_stored_host() {
    let mut resolver = MockHostResolver::new();
    resolver.expect_resolve().returning(|_| None);
    let h = HarnessBuilder::new()
        .with_record(agent_record(
            "pve01",
            "https://pve.example.com:8006",
            "pulse-monitor@pam!pulse-1",
        ))
        .customize(move |builder| builder.host_resolver(Arc::new(resolver)))
        .build();

    let matched = h.agent_request("192.168.1.100", "pve01", "pulse-monitor@pam!pulse-1", "s1");
    h.engine.auto_register(&h.org, matched).await.unwrap();
    let fresh = h.agent_request("10.0.0.7", "pve02", "pulse-monitor@pam!pulse-2", "s2");
    h.engine.auto_register(&h.org, fresh).await.unwrap();

    let hosts: Vec<String> = h
        .events
        .events
        .lock()
        .iter()
        .filter_map(|event| match &event.payload {
            EventPayload::NodeAutoRegistered { host, .. } => Some(host.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        hosts,
        ["https://pve.example.com:8006", "https://10.0.0.7:8006"]
    );
}

#[tokio::test]
async fn test_agent_record_host_survives_name_and_token_match() {
    let h = HarnessBuilder::new()
        .with_record(agent_record(
            "pve01",
            "https://pve.example.com:8006",
            "pulse-monitor@pam!pulse-1",
        ))
        .build();

    for secret in ["first", "second"] {
        let request = h.agent_request(
            "https://192.168.1.100:8006",
            "pve01",
            "pulse-monitor@pam!pulse-1",
            secret,
        );
        h.engine.auto_register(&h.org, request).await.unwrap();
    }

    let stored = h.stored();
    assert_eq!(stored.pve.len(), 1);
    assert_eq!(stored.pve[0].host.as_str(), "https://pve.example.com:8006");
    assert_eq!(secret_of(&stored.pve[0].credentials), "second");
}

#[tokio::test]
async fn test_cluster_member_merges_into_existing_record() {
    let mut probe = MockClusterProbe::new();
    probe.expect_probe().returning(|_, _, _| {
        ClusterDetection::clustered(
            "alpha",
            vec![endpoint("a", "10.0.0.1"), endpoint("b", "10.0.0.2")],
        )
    });
    let h = HarnessBuilder::new()
        .with_record(cluster_record(
            "pri",
            "https://10.0.0.1:8006",
            "alpha",
            vec![endpoint("a", "10.0.0.1")],
        ))
        .with_probe(probe)
        .build();

    let request = h.agent_request(
        "https://10.0.0.2:8006",
        "b",
        "pulse-monitor@pam!pulse-b",
        "secret",
    );
    let outcome = h.engine.auto_register(&h.org, request).await.unwrap();
    let AutoRegisterOutcome::Merged(merge) = outcome else {
        panic!("expected a cluster merge");
    };
    assert!(merge.merged);
    assert_eq!(merge.cluster, "alpha");
    assert_eq!(merge.total_endpoints, 2);

    let stored = h.stored();
    assert_eq!(stored.pve.len(), 1);
    let names: Vec<_> = stored.pve[0]
        .pve()
        .unwrap()
        .cluster_endpoints
        .iter()
        .map(|e| e.node_name.as_str())
        .collect();
    assert_eq!(names, ["a", "b"]);
}

#[tokio::test]
async fn test_add_folds_cluster_member() {
    let mut probe = MockClusterProbe::new();
    probe.expect_probe().returning(|_, _, _| {
        ClusterDetection::clustered(
            "alpha",
            vec![endpoint("a", "10.0.0.1"), endpoint("c", "10.0.0.3")],
        )
    });
    let h = HarnessBuilder::new()
        .with_record(cluster_record(
            "pri",
            "https://10.0.0.1:8006",
            "alpha",
            vec![endpoint("a", "10.0.0.1")],
        ))
        .with_probe(probe)
        .build();

    let outcome = h
        .engine
        .add(&h.org, add_request("pve", "c", "10.0.0.3"))
        .await
        .unwrap();
    let AddNodeOutcome::Merged(merge) = outcome else {
        panic!("expected a cluster merge");
    };
    assert_eq!(merge.existing_node, "pri");
    assert_eq!(h.stored().pve.len(), 1);
}

#[tokio::test]
async fn test_repeated_registration_is_idempotent() {
    let h = HarnessBuilder::new().build();
    for _ in 0..3 {
        let request = h.agent_request(
            "10.0.5.5",
            "px5",
            "pulse-monitor@pam!pulse-5",
            "same",
        );
        h.engine.auto_register(&h.org, request).await.unwrap();
    }

    let stored = h.stored();
    assert_eq!(stored.pve.len(), 1);
    assert_eq!(stored.pve[0].name, "px5");
    assert_eq!(stored.pve[0].fingerprint.as_deref(), Some("AA:BB:CC:DD"));

    let listed = h.engine.list(&h.org).await.unwrap();
    assert_eq!(listed[0].status, NodeStatus::Connected);
}

#[tokio::test]
async fn test_update_without_auth_fields_keeps_secret() {
    let h = HarnessBuilder::new()
        .with_record(pve_record("px1", "https://10.0.0.1:8006", "pulse-monitor@pam!a"))
        .build();

    let request = NodeConfigRequest {
        name: Some("renamed".into()),
        monitor_vms: Some(false),
        ..Default::default()
    };
    h.engine.update(&h.org, "pve-0", request).await.unwrap();

    let record = &h.stored().pve[0];
    assert_eq!(record.name, "renamed");
    assert_eq!(secret_of(&record.credentials), "old-secret");
    assert_eq!(record.credentials.token_id(), Some("pulse-monitor@pam!a"));
    assert!(!record.pve().unwrap().monitor_vms);
    assert!(record.pve().unwrap().monitor_containers);
}

#[tokio::test]
async fn test_update_switches_auth_mode() {
    let h = HarnessBuilder::new()
        .with_record(pve_record("px1", "https://10.0.0.1:8006", "pulse-monitor@pam!a"))
        .build();

    let request = NodeConfigRequest {
        user: Some("root".into()),
        password: Some("pw".into()),
        ..Default::default()
    };
    h.engine.update(&h.org, "pve-0", request).await.unwrap();

    let record = &h.stored().pve[0];
    assert_eq!(record.credentials.user(), Some("root@pam"));
    assert!(record.credentials.has_password());
    assert!(!record.credentials.has_token());
}

#[tokio::test]
async fn test_pbs_password_is_exchanged_for_token() {
    let h = HarnessBuilder::new().build();
    let request = NodeConfigRequest {
        node_type: Some("pbs".into()),
        name: Some("backup".into()),
        host: Some("10.0.0.9".into()),
        user: Some("admin".into()),
        password: Some("pw".into()),
        ..Default::default()
    };
    h.engine.add(&h.org, request).await.unwrap();

    let record = &h.stored().pbs[0];
    assert_eq!(record.host.as_str(), "https://10.0.0.9:8007");
    assert!(record.credentials.has_token());
    assert!(!record.credentials.has_password());
    assert!(
        record
            .credentials
            .token_id()
            .unwrap()
            .starts_with("pulse-monitor@pbs!pulse-")
    );
    assert_eq!(h.clients.login_users.lock().as_slice(), ["admin@pbs"]);
}

#[tokio::test]
async fn test_pbs_keeps_password_when_token_creation_fails() {
    let h = HarnessBuilder::new().failing_token_creation().build();
    let request = NodeConfigRequest {
        node_type: Some("pbs".into()),
        name: Some("backup".into()),
        host: Some("10.0.0.9".into()),
        user: Some("admin@pbs".into()),
        password: Some("pw".into()),
        ..Default::default()
    };
    h.engine.add(&h.org, request).await.unwrap();

    let record = &h.stored().pbs[0];
    assert!(record.credentials.has_password());
    assert_eq!(h.clients.token_requests.load(Ordering::SeqCst), 1);
    let NodeDetails::Pbs(pbs) = &record.details else {
        panic!("expected pbs details");
    };
    assert!(pbs.monitor_backups);
    assert!(!pbs.monitor_sync_jobs);
}

#[tokio::test]
async fn test_secure_flow_mints_token_and_drops_password() {
    let h = HarnessBuilder::new().build();
    let body = serde_json::json!({
        "type": "pve",
        "host": "10.0.0.4",
        "serverName": "px4",
        "requestToken": true,
        "username": "root",
        "password": "pw",
        "authToken": AGENT_TOKEN
    })
    .to_string();

    let outcome = h
        .engine
        .admit_auto_register(AutoRegisterCall {
            body: body.as_bytes(),
            api_token: None,
            peer: None,
            forwarded_for: None,
            org: h.org.clone(),
        })
        .await
        .unwrap();
    let AutoRegisterOutcome::Registered(response) = outcome else {
        panic!("expected a registration");
    };
    assert_eq!(response.action, Some("create_token"));
    assert_eq!(response.token_value.as_deref(), Some("minted-secret"));

    let record = &h.stored().pve[0];
    assert_eq!(record.name, "px4");
    assert!(record.credentials.has_token());
    assert!(!record.credentials.has_password());
    assert_eq!(h.clients.login_users.lock().as_slice(), ["root@pam"]);
}

#[tokio::test]
async fn test_secure_flow_rejects_pmg() {
    let h = HarnessBuilder::new().build();
    let body = serde_json::json!({
        "type": "pmg",
        "host": "10.0.0.4",
        "requestToken": true,
        "username": "root",
        "password": "pw",
        "authToken": AGENT_TOKEN
    })
    .to_string();

    let err = h
        .engine
        .admit_auto_register(AutoRegisterCall {
            body: body.as_bytes(),
            api_token: None,
            peer: None,
            forwarded_for: None,
            org: h.org.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidKind(_)));
    assert!(h.stored().is_empty());
}

#[tokio::test]
async fn test_unscoped_api_token_is_refused() {
    let h = HarnessBuilder::new().build();
    h.engine
        .api_tokens()
        .register("read-only", ["monitoring:read"], None);
    let body = serde_json::json!({
        "type": "pve",
        "host": "10.0.0.4",
        "tokenId": "pulse-monitor@pam!pulse",
        "tokenValue": "v"
    })
    .to_string();

    let err = h
        .engine
        .admit_auto_register(AutoRegisterCall {
            body: body.as_bytes(),
            api_token: Some("read-only"),
            peer: None,
            forwarded_for: None,
            org: h.org.clone(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Unauthorized(UnauthorizedReason::Invalid)
    ));
}

#[tokio::test]
async fn test_delete_then_missing() {
    let h = HarnessBuilder::new()
        .with_record(pve_record("px1", "https://10.0.0.1:8006", "pulse-monitor@pam!a"))
        .build();

    h.engine.delete(&h.org, "pve-0").await.unwrap();
    assert!(h.stored().is_empty());
    assert!(h.events.kinds().contains(&"node_deleted"));

    let err = h.engine.delete(&h.org, "pve-0").await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));
}

#[tokio::test]
async fn test_refresh_cluster_replaces_endpoints() {
    let mut probe = MockClusterProbe::new();
    probe
        .expect_probe()
        .withf(|_, instance, _| instance.is_empty())
        .returning(|_, _, _| {
            ClusterDetection::clustered(
                "Unknown Cluster",
                vec![
                    endpoint("a", "10.0.0.1"),
                    endpoint("b", "10.0.0.2"),
                    endpoint("c", "10.0.0.3"),
                ],
            )
        });
    let h = HarnessBuilder::new()
        .with_record(cluster_record(
            "pri",
            "https://10.0.0.1:8006",
            "alpha",
            vec![endpoint("a", "10.0.0.1")],
        ))
        .with_probe(probe)
        .build();

    let response = h.engine.refresh_cluster(&h.org, "pve-0").await.unwrap();
    assert_eq!(response.cluster_name, "alpha");
    assert_eq!(response.old_node_count, 1);
    assert_eq!(response.new_node_count, 3);
    assert_eq!(response.nodes_added, 2);
    assert_eq!(h.stored().pve[0].pve().unwrap().cluster_endpoints.len(), 3);
}

#[tokio::test]
async fn test_refresh_standalone_is_not_clustered() {
    let h = HarnessBuilder::new()
        .with_record(pve_record("px1", "https://10.0.0.1:8006", "pulse-monitor@pam!a"))
        .build();
    let err = h.engine.refresh_cluster(&h.org, "pve-0").await.unwrap_err();
    assert!(matches!(err, RegistryError::NotClustered(_)));

    let err = h.engine.refresh_cluster(&h.org, "pmg-0").await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidKind(_)));
}

#[tokio::test]
async fn test_connection_test_reports_kind_specific_summary() {
    let h = HarnessBuilder::new()
        .with_record(pve_record("px1", "https://10.0.0.1:8006", "pulse-monitor@pam!a"))
        .build();

    let response = h.engine.test_node(&h.org, "pve-0").await.unwrap();
    assert_eq!(response.status, "success");

    let request = NodeConfigRequest {
        node_type: Some("pbs".into()),
        host: Some("10.0.0.9".into()),
        token_name: Some("pulse-monitor@pbs!pulse".into()),
        token_value: Some("v".into()),
        ..Default::default()
    };
    let response = h.engine.test_connection(&request).await.unwrap();
    assert!(response.message.contains("1 datastores"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_serialize() {
    let h = HarnessBuilder::new().build();
    let mut tasks = Vec::new();
    for i in 0..8 {
        let engine = h.engine.clone();
        let org = h.org.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .add(&org, add_request("pve", &format!("n{i}"), &format!("10.0.9.{i}")))
                .await
        }));
    }
    for i in 0..4 {
        let engine = h.engine.clone();
        let org = h.org.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .add(&org, add_request("pve", &format!("dup{i}"), "10.0.9.200"))
                .await
        }));
    }

    let mut conflicts = 0;
    for task in tasks {
        if let Err(RegistryError::Conflict(_)) = task.await.unwrap() {
            conflicts += 1;
        }
    }
    assert_eq!(conflicts, 3);

    let stored = h.stored();
    assert_eq!(stored.pve.len(), 9);
    let hosts: HashSet<_> = stored.pve.iter().map(|r| r.host.as_str()).collect();
    assert_eq!(hosts.len(), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cluster_members_share_one_record() {
    let mut probe = MockClusterProbe::new();
    probe.expect_probe().returning(|config, _, _| {
        let ip = config
            .host
            .trim_start_matches("https://")
            .trim_end_matches(":8006")
            .to_string();
        ClusterDetection::clustered("beta", vec![endpoint(&format!("node-{ip}"), &ip)])
    });
    let h = HarnessBuilder::new().with_probe(probe).build();

    let mut tasks = Vec::new();
    for i in 1..=5 {
        let engine = h.engine.clone();
        let org = h.org.clone();
        let request = h.agent_request(
            &format!("10.0.7.{i}"),
            &format!("member{i}"),
            &format!("pulse-monitor@pam!pulse-{i}"),
            "s",
        );
        tasks.push(tokio::spawn(async move {
            engine.auto_register(&org, request).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let stored = h.stored();
    let beta: Vec<_> = stored
        .pve
        .iter()
        .filter(|r| r.cluster_name() == Some("beta"))
        .collect();
    assert_eq!(beta.len(), 1);
    assert_eq!(beta[0].pve().unwrap().cluster_endpoints.len(), 5);
    assert_eq!(stored.nodes(NodeKind::Pve).len(), 1);
}

#[tokio::test]
async fn test_persistence_failure_is_surfaced() {
    let h = HarnessBuilder::new().build();
    h.store.fail_saves(true);
    let err = h
        .engine
        .add(&h.org, add_request("pve", "px1", "10.0.0.1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Persistence(_)));
    assert_eq!(err.status_code(), 500);
    assert!(h.engine.list(&h.org).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mock_mode_blocks_every_mutation() {
    let h = HarnessBuilder::new()
        .with_config(crate::config::RegistryConfig {
            mock_mode: true,
            ..Default::default()
        })
        .with_record(pve_record("px1", "https://10.0.0.1:8006", "pulse-monitor@pam!a"))
        .build();

    let request = h.agent_request("10.0.0.2", "px2", "pulse-monitor@pam!b", "s");
    assert!(matches!(
        h.engine.auto_register(&h.org, request).await,
        Err(RegistryError::Forbidden(_))
    ));
    assert!(matches!(
        h.engine.delete(&h.org, "pve-0").await,
        Err(RegistryError::Forbidden(_))
    ));
    assert_eq!(h.engine.list(&h.org).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_pbs_rename_carries_alert_override() {
    let mut backup = pve_record("unused", "https://10.0.0.9:8007", "pulse-monitor@pbs!a");
    backup.details = NodeDetails::defaults_for(NodeKind::Pbs);
    backup.name = "backup-old".into();
    backup.host = crate::core::domain::value_object::NodeHost::parse("10.0.0.9", NodeKind::Pbs)
        .unwrap();
    let alerts: crate::core::domain::model::alert_config::AlertConfig =
        serde_json::from_value(serde_json::json!({
            "enabled": true,
            "overrides": {"pbs-backup-old": {"disabled": true}}
        }))
        .unwrap();
    let h = HarnessBuilder::new()
        .with_record(backup)
        .with_alerts(alerts)
        .build();

    let request = NodeConfigRequest {
        name: Some("backup-new".into()),
        ..Default::default()
    };
    h.engine.update(&h.org, "pbs-0", request).await.unwrap();

    let alerts = h.store.alerts_snapshot();
    assert!(alerts.overrides.contains_key("pbs-backup-new"));
    assert!(!alerts.overrides.contains_key("pbs-backup-old"));
    assert_eq!(alerts.other["enabled"], true);
}
