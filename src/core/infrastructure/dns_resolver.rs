use crate::core::domain::{contract::HostResolver, value_object::resolve_ip};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Resolves hosts through the system resolver under a fixed timeout.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    timeout: Duration,
}

impl DnsResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for DnsResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl HostResolver for DnsResolver {
    async fn resolve(&self, host: &str) -> Option<IpAddr> {
        resolve_ip(host, self.timeout).await
    }
}
