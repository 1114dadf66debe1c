//! Runtime configuration for the registry and its outbound clients.

use ipnet::IpNet;
use std::env;
use std::net::IpAddr;
use std::time::Duration;

/// Rate limiting configuration for outbound API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum number of requests per second.
    pub requests_per_second: u32,
    /// Maximum burst size (number of requests allowed above the rate).
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 20,
        }
    }
}

/// Settings shared by every HTTP client the factory builds.
#[derive(Debug, Clone, Default)]
pub struct ApiClientConfig {
    /// Optional rate limiting; `None` disables it.
    pub rate_limit: Option<RateLimitConfig>,
}

/// Timings of the cluster probe.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub status_attempts: u32,
    /// Back-off before attempt `n` is `n * backoff_unit`
    pub backoff_unit: Duration,
    pub status_timeout: Duration,
    pub validation_timeout: Duration,
    pub interface_timeout: Duration,
    pub dns_timeout: Duration,
    /// Minimum gap between background probes of the same instance
    pub cooldown: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            status_attempts: 3,
            backoff_unit: Duration::from_secs(1),
            status_timeout: Duration::from_secs(5),
            validation_timeout: Duration::from_secs(2),
            interface_timeout: Duration::from_secs(5),
            dns_timeout: Duration::from_secs(2),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Host-side flags and limits recognized by the registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Running inside a container; SSH-dependent features are unavailable
    pub container: bool,
    pub dev_mode: bool,
    pub allow_container_ssh: bool,
    /// Demo mode: every mutation is refused
    pub mock_mode: bool,
    /// Peers whose `X-Forwarded-For` header is believed
    pub trusted_proxies: Vec<IpNet>,
    /// Name of this service instance, used to name minted monitoring tokens
    pub instance_name: String,
    /// Externally reachable base URL, used in setup commands
    pub public_url: Option<String>,
    pub max_node_body: usize,
    pub max_setup_url_body: usize,
    pub max_auto_register_body: usize,
    /// Timeout of connection tests
    pub connection_test_timeout: Duration,
    pub setup_token_ttl: Duration,
    pub setup_token_grace: Duration,
    pub setup_token_sweep_interval: Duration,
    pub recent_registration_ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            container: false,
            dev_mode: false,
            allow_container_ssh: false,
            mock_mode: false,
            trusted_proxies: Vec::new(),
            instance_name: "pulse".to_string(),
            public_url: None,
            max_node_body: 32 * 1024,
            max_setup_url_body: 8 * 1024,
            max_auto_register_body: 32 * 1024,
            connection_test_timeout: Duration::from_secs(10),
            setup_token_ttl: Duration::from_secs(5 * 60),
            setup_token_grace: Duration::from_secs(60),
            setup_token_sweep_interval: Duration::from_secs(5 * 60),
            recent_registration_ttl: Duration::from_secs(2 * 60),
        }
    }
}

impl RegistryConfig {
    /// Reads `PULSE_DOCKER`, `PULSE_DEV`, `NODE_ENV`, `PULSE_DEV_ALLOW_CONTAINER_SSH`,
    /// `PULSE_MOCK_MODE`, `PULSE_TRUSTED_PROXY_CIDRS`, `PULSE_PUBLIC_URL` and `HOSTNAME`
    /// on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.container = env_flag("PULSE_DOCKER");
        config.dev_mode = env_flag("PULSE_DEV")
            || env::var("NODE_ENV").is_ok_and(|v| v.eq_ignore_ascii_case("development"));
        config.allow_container_ssh = env_flag("PULSE_DEV_ALLOW_CONTAINER_SSH");
        config.mock_mode = env_flag("PULSE_MOCK_MODE");
        if let Ok(raw) = env::var("PULSE_TRUSTED_PROXY_CIDRS") {
            config.trusted_proxies = parse_trusted_proxies(&raw);
        }
        if let Ok(url) = env::var("PULSE_PUBLIC_URL") {
            let url = url.trim().trim_end_matches('/').to_string();
            if !url.is_empty() {
                config.public_url = Some(url);
            }
        }
        if let Ok(hostname) = env::var("HOSTNAME") {
            let hostname = hostname.trim();
            if !hostname.is_empty() {
                config.instance_name = hostname.to_string();
            }
        }
        config
    }

    /// SSH-backed features (temperature collection) are off inside containers unless
    /// explicitly allowed or running in dev mode.
    pub fn ssh_restricted(&self) -> bool {
        self.container && !(self.allow_container_ssh || self.dev_mode)
    }

    pub fn is_trusted_proxy(&self, peer: IpAddr) -> bool {
        let peer = peer.to_canonical();
        self.trusted_proxies.iter().any(|net| net.contains(&peer))
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).is_ok_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
}

/// Parses a comma-separated list of CIDRs or bare IPs. Invalid entries are logged and
/// skipped.
pub fn parse_trusted_proxies(raw: &str) -> Vec<IpNet> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            if let Ok(net) = entry.parse::<IpNet>() {
                return Some(net);
            }
            match entry.parse::<IpAddr>() {
                Ok(ip) => {
                    let prefix = if ip.is_ipv4() { 32 } else { 128 };
                    IpNet::new(ip, prefix).ok()
                }
                Err(_) => {
                    tracing::warn!(entry, "ignoring invalid trusted proxy entry");
                    None
                }
            }
        })
        .collect()
}
