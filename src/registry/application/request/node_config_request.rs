use serde::Deserialize;

/// Body of add, update and connection-test calls.
///
/// Every field is optional so an update can tell "absent" from "set to false".
#[derive(Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfigRequest {
    #[serde(rename = "type")]
    pub node_type: Option<String>,
    pub name: Option<String>,
    pub host: Option<String>,
    #[serde(rename = "guestURL")]
    pub guest_url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub token_name: Option<String>,
    pub token_value: Option<String>,
    pub fingerprint: Option<String>,
    #[serde(rename = "verifySSL")]
    pub verify_ssl: Option<bool>,
    #[serde(rename = "monitorVMs")]
    pub monitor_vms: Option<bool>,
    pub monitor_containers: Option<bool>,
    pub monitor_storage: Option<bool>,
    pub monitor_backups: Option<bool>,
    pub monitor_physical_disks: Option<bool>,
    pub physical_disk_polling_minutes: Option<u32>,
    pub temperature_monitoring_enabled: Option<bool>,
    pub monitor_datastores: Option<bool>,
    pub monitor_sync_jobs: Option<bool>,
    pub monitor_verify_jobs: Option<bool>,
    pub monitor_prune_jobs: Option<bool>,
    pub monitor_garbage_jobs: Option<bool>,
    pub exclude_datastores: Option<Vec<String>>,
    pub monitor_mail_stats: Option<bool>,
    pub monitor_queues: Option<bool>,
    pub monitor_quarantine: Option<bool>,
    pub monitor_domain_stats: Option<bool>,
}

impl NodeConfigRequest {
    /// A non-blank string field.
    pub(crate) fn present(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub(crate) fn has_token_fields(&self) -> bool {
        Self::present(&self.token_name).is_some() || Self::present(&self.token_value).is_some()
    }

    pub(crate) fn has_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

impl std::fmt::Debug for NodeConfigRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfigRequest")
            .field("node_type", &self.node_type)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("has_password", &self.has_password())
            .field("token_name", &self.token_name)
            .field("has_token", &self.token_value.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_and_false_are_distinct() {
        let request: NodeConfigRequest = serde_json::from_value(serde_json::json!({
            "type": "pve",
            "monitorVMs": false,
            "verifySSL": true,
            "guestURL": "https://pve.example.com"
        }))
        .unwrap();
        assert_eq!(request.monitor_vms, Some(false));
        assert_eq!(request.monitor_containers, None);
        assert_eq!(request.verify_ssl, Some(true));
        assert_eq!(request.guest_url.as_deref(), Some("https://pve.example.com"));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let request = NodeConfigRequest {
            password: Some("hunter2".into()),
            token_value: Some("tok-secret".into()),
            ..Default::default()
        };
        let text = format!("{request:?}");
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("tok-secret"));
    }
}
