use crate::core::domain::{
    error::ValidationError,
    value_object::{NodeKind, parse_port},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Characters that never appear in a DNS name but do appear in shell payloads.
const FORBIDDEN_HOSTNAME_CHARS: &[char] = &[
    '/', '\\', '<', '>', '|', '"', '\'', '`', ';', '&', '$', '(', ')', '{', '}', '*', '?', '!',
    '#', '%', '^', '~', '=', ',', '@', '[', ']',
];

/// A canonical node URL: `http(s)://host:port`, no path, query or fragment.
///
/// All identity comparisons between node records are plain string equality on this
/// form, so every host that enters the registry goes through [`NodeHost::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHost(String);

impl NodeHost {
    /// Normalizes a user-supplied host for the given kind.
    ///
    /// # Errors
    /// Returns `ValidationError` for empty input, control or shell characters in a
    /// hostname, malformed IP literals, a foreign scheme or a port outside 1-65535.
    pub fn parse(raw: &str, kind: NodeKind) -> Result<Self, ValidationError> {
        normalize_host(raw, kind)
    }

    /// Wraps an already canonical URL without validation.
    pub(crate) fn new_unchecked(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .unwrap_or("https")
    }

    /// Host part without brackets or port.
    pub fn hostname(&self) -> &str {
        split_authority(authority_of(&self.0))
            .map(|(host, _)| host)
            .unwrap_or_default()
    }

    pub fn port(&self) -> Option<u16> {
        split_authority(authority_of(&self.0))
            .ok()
            .and_then(|(_, port)| port)
            .and_then(|port| port.parse().ok())
    }

    /// The literal IP of this host, `None` for DNS names.
    pub fn ip(&self) -> Option<IpAddr> {
        self.hostname().parse().ok()
    }

    /// Builds a URL for another host that shares this host's scheme and port.
    pub fn with_hostname(&self, hostname: &str) -> String {
        let host = if hostname.contains(':') && !hostname.starts_with('[') {
            format!("[{hostname}]")
        } else {
            hostname.to_string()
        };
        match self.port() {
            Some(port) => format!("{}://{}:{}", self.scheme(), host, port),
            None => format!("{}://{}", self.scheme(), host),
        }
    }
}

impl fmt::Display for NodeHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeHost {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Returns the bare hostname (or IP) of a raw or canonical host string.
pub fn hostname_of(raw: &str) -> String {
    let trimmed = raw.trim();
    let rest = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    split_authority(authority)
        .map(|(host, _)| host.to_string())
        .unwrap_or_default()
}

pub(crate) fn normalize_host(raw: &str, kind: NodeKind) -> Result<NodeHost, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::field("host", "Host is required"));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::field(
            "host",
            "Host contains invalid characters",
        ));
    }

    let (scheme, rest) = split_scheme(trimmed)?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if authority.is_empty() {
        return Err(ValidationError::field("host", "Invalid host format"));
    }

    let (host, port) = split_authority(authority)?;
    let host = validate_host_literal(host)?;
    let port = match port {
        Some(port) => parse_port(port)?,
        None => kind.default_port(),
    };

    let bracketed = if host.contains(':') {
        format!("[{host}]")
    } else {
        host
    };
    let url = Url::parse(&format!("{scheme}://{bracketed}:{port}"))
        .map_err(|e| ValidationError::Format(format!("Invalid host format: {e}")))?;
    let canonical = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => format!("[{addr}]"),
        _ => return Err(ValidationError::field("host", "Invalid host format")),
    };

    Ok(NodeHost(format!("{scheme}://{canonical}:{port}")))
}

fn split_scheme(value: &str) -> Result<(&'static str, &str), ValidationError> {
    match value.split_once("://") {
        None => Ok(("https", value)),
        Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
            "https" => Ok(("https", rest)),
            "http" => Ok(("http", rest)),
            _ => Err(ValidationError::field(
                "host",
                "Host scheme must be http or https",
            )),
        },
    }
}

fn authority_of(url: &str) -> &str {
    url.split_once("://").map(|(_, rest)| rest).unwrap_or(url)
}

/// Splits `host[:port]`, `[v6][:port]` or a bare IPv6 literal.
fn split_authority(authority: &str) -> Result<(&str, Option<&str>), ValidationError> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| ValidationError::field("host", "Invalid IPv6 address"))?;
        if tail.is_empty() {
            return Ok((host, None));
        }
        return match tail.strip_prefix(':') {
            Some(port) => Ok((host, Some(port))),
            None => Err(ValidationError::field("host", "Invalid host format")),
        };
    }

    if authority.matches(':').count() > 1 {
        return Ok((authority, None));
    }

    match authority.split_once(':') {
        Some((host, port)) => Ok((host, Some(port))),
        None => Ok((authority, None)),
    }
}

fn validate_host_literal(host: &str) -> Result<String, ValidationError> {
    if host.is_empty() {
        return Err(ValidationError::field("host", "Invalid host format"));
    }

    if host.contains(':') {
        let addr: Ipv6Addr = host
            .parse()
            .map_err(|_| ValidationError::field("host", "Invalid IPv6 address"))?;
        return Ok(addr.to_string());
    }

    if host.starts_with(|c: char| c.is_ascii_digit()) {
        let addr: Ipv4Addr = host
            .parse()
            .map_err(|_| ValidationError::field("host", "Invalid IP address"))?;
        return Ok(addr.to_string());
    }

    if host
        .chars()
        .any(|c| c.is_whitespace() || FORBIDDEN_HOSTNAME_CHARS.contains(&c))
    {
        return Err(ValidationError::field(
            "host",
            "Host contains invalid characters",
        ));
    }

    Ok(host.to_string())
}
