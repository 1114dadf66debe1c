use crate::core::domain::model::node_record::{Credentials, NodeRecord};
use std::time::Duration;

/// Default per-request timeout for clients built from stored records.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to open a temporary client against one Proxmox endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL, `scheme://host:port`
    pub host: String,
    pub credentials: Credentials,
    /// Pinned SHA-256 certificate fingerprint
    pub fingerprint: Option<String>,
    pub verify_ssl: bool,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            credentials,
            fingerprint: None,
            verify_ssl: false,
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    pub fn from_record(record: &NodeRecord) -> Self {
        Self {
            host: record.host.as_str().to_string(),
            credentials: record.credentials.clone(),
            fingerprint: record.pinned_fingerprint().map(str::to_string),
            verify_ssl: record.verify_ssl,
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.fingerprint = fingerprint.filter(|fp| !fp.is_empty());
        self
    }

    /// Drops fingerprint pinning and certificate verification.
    #[must_use]
    pub fn relaxed(mut self) -> Self {
        self.fingerprint = None;
        self.verify_ssl = false;
        self
    }
}
