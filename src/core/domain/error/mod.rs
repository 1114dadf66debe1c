use thiserror::Error;

/// The main error type for registration operations.
///
/// Every variant maps onto one HTTP status through [`RegistryError::status_code`] and
/// onto a caller-safe text through [`RegistryError::public_message`]. The `Display`
/// output carries full detail and is meant for logs only.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Missing or malformed input (bad host, bad IP, port out of range, ...)
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A record of the same kind already owns the canonical host
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unknown node ID or organization
    #[error("Not found: {0}")]
    NotFound(String),

    /// Auto-registration caller could not be authenticated
    #[error("Unauthorized: {0}")]
    Unauthorized(UnauthorizedReason),

    /// Mutation refused in the current mode
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// An outbound call to a Proxmox endpoint failed
    ///
    /// # Fields
    /// * `operation` - What the registry was doing when the call failed
    /// * `source` - The structured upstream failure
    #[error("Upstream error during {operation}: {source}")]
    Upstream {
        operation: UpstreamOperation,
        source: UpstreamError,
    },

    /// Operation is only defined for another node kind
    #[error("Invalid node kind: {0}")]
    InvalidKind(String),

    /// Cluster refresh requested for a standalone node
    #[error("Not clustered: {0}")]
    NotClustered(String),

    /// The node store rejected a load or save
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    pub(crate) fn upstream(operation: UpstreamOperation, source: UpstreamError) -> Self {
        RegistryError::Upstream { operation, source }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RegistryError::Validation(_) => 400,
            RegistryError::Conflict(_) => 409,
            RegistryError::NotFound(_) => 404,
            RegistryError::Unauthorized(_) => 401,
            RegistryError::Forbidden(_) => 403,
            RegistryError::Upstream { .. } => 400,
            RegistryError::InvalidKind(_) => 400,
            RegistryError::NotClustered(_) => 400,
            RegistryError::Persistence(_) => 500,
            RegistryError::Internal(_) => 500,
        }
    }

    /// Message that is safe to hand back to a remote caller.
    ///
    /// Upstream text is never echoed: a misconfigured proxy in front of a Proxmox host
    /// may reflect credentials in its error pages.
    pub fn public_message(&self) -> String {
        match self {
            RegistryError::Validation(e) => e.user_message(),
            RegistryError::Conflict(msg)
            | RegistryError::Forbidden(msg)
            | RegistryError::InvalidKind(msg)
            | RegistryError::NotClustered(msg) => msg.clone(),
            RegistryError::NotFound(_) => "Node not found".to_string(),
            RegistryError::Unauthorized(reason) => reason.to_string(),
            RegistryError::Upstream { operation, .. } => operation.public_message().to_string(),
            RegistryError::Persistence(_) => "Failed to save configuration".to_string(),
            RegistryError::Internal(_) => "Operation failed".to_string(),
        }
    }
}

/// Why an auto-registration call was rejected.
///
/// The two cases are kept apart so operators can tell a missing token from a stale one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    #[error("Pulse requires authentication")]
    Missing,
    #[error("Invalid or expired setup code")]
    Invalid,
}

/// Registry step during which an upstream call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamOperation {
    CreateClient,
    Connection,
    ClusterDetection,
    TokenCreation,
}

impl UpstreamOperation {
    fn public_message(&self) -> &'static str {
        match self {
            UpstreamOperation::CreateClient => "Failed to initialize connection",
            UpstreamOperation::Connection => {
                "Connection failed. Please check your credentials and network settings"
            }
            UpstreamOperation::ClusterDetection => "Cluster detection failed",
            UpstreamOperation::TokenCreation => "Failed to create monitoring token",
        }
    }
}

impl std::fmt::Display for UpstreamOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UpstreamOperation::CreateClient => "client creation",
            UpstreamOperation::Connection => "connection",
            UpstreamOperation::ClusterDetection => "cluster detection",
            UpstreamOperation::TokenCreation => "token creation",
        };
        f.write_str(name)
    }
}

/// Structured failure of an outbound Proxmox call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The endpoint answered with a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("TLS failure: {0}")]
    Tls(TlsFailure),

    /// Connection refused, DNS failure, reset, ...
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    /// The body did not match the expected shape
    #[error("Invalid response: {0}")]
    Decode(String),

    /// The endpoint kind does not offer the requested operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The endpoint is a real Proxmox API that refused us for lack of privilege.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            UpstreamError::Status { status, message } => {
                matches!(status, 401 | 403) || message.to_lowercase().contains("permission")
            }
            _ => false,
        }
    }

    /// Proxmox answers 501 for cluster endpoints on a standalone install.
    pub fn is_not_implemented(&self) -> bool {
        match self {
            UpstreamError::Status { status, message } => {
                *status == 501 || message.to_lowercase().contains("not implemented")
            }
            _ => false,
        }
    }

    pub fn is_tls_mismatch(&self) -> bool {
        matches!(self, UpstreamError::Tls(_))
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return UpstreamError::Timeout;
        }
        if let Some(status) = error.status() {
            return UpstreamError::Status {
                status: status.as_u16(),
                message: error.to_string(),
            };
        }
        if error.is_decode() {
            return UpstreamError::Decode(error.to_string());
        }
        if let Some(failure) = tls_failure_in(&error) {
            return UpstreamError::Tls(failure);
        }
        UpstreamError::Transport(error.to_string())
    }
}

/// Finds a rustls rejection in the source chain of a failed request.
///
/// The handshake error reaches us as the inner value of an `io::Error`, which
/// `source()` skips over, so those are unwrapped explicitly.
fn tls_failure_in(error: &(dyn std::error::Error + 'static)) -> Option<TlsFailure> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(rejected) = err.downcast_ref::<rustls::Error>() {
            return Some(TlsFailure::from(rejected));
        }
        if let Some(inner) = err
            .downcast_ref::<std::io::Error>()
            .and_then(std::io::Error::get_ref)
        {
            if let Some(failure) = tls_failure_in(inner) {
                return Some(failure);
            }
        }
        current = err.source();
    }
    None
}

/// TLS-level reasons a connection was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TlsFailure {
    /// The live certificate does not hash to the pinned fingerprint
    #[error("fingerprint mismatch (expected {expected}, got {actual})")]
    FingerprintMismatch { expected: String, actual: String },

    /// Handshake or chain verification failed
    #[error("certificate error: {0}")]
    Certificate(String),
}

impl From<&rustls::Error> for TlsFailure {
    fn from(error: &rustls::Error) -> Self {
        if let rustls::Error::InvalidCertificate(rustls::CertificateError::Other(other)) = error {
            if let Some(failure) = other.0.downcast_ref::<TlsFailure>() {
                return failure.clone();
            }
        }
        TlsFailure::Certificate(error.to_string())
    }
}

/// Specialized error type for validation failures.
///
/// This enum provides detailed context about why a validation
/// failed, including field-specific errors and format violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Represents a validation failure for a specific field
    ///
    /// # Fields
    /// * `field` - The name of the field that failed validation
    /// * `message` - A detailed message about why validation failed
    #[error("Field '{field}' validation failed: {message}")]
    Field { field: String, message: String },

    /// Represents format/syntax validation failures
    #[error("Format error: {0}")]
    Format(String),

    /// Represents violations of domain constraints
    #[error("Domain constraint violation: {0}")]
    ConstraintViolation(String),
}

impl ValidationError {
    pub(crate) fn field(field: &str, message: impl Into<String>) -> Self {
        ValidationError::Field {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// The message without the internal prefix, for API responses.
    pub fn user_message(&self) -> String {
        match self {
            ValidationError::Field { message, .. } => message.clone(),
            ValidationError::Format(message) => message.clone(),
            ValidationError::ConstraintViolation(message) => message.clone(),
        }
    }
}

/// Type alias for Results that may fail with a RegistryError
pub type RegistryResult<T> = Result<T, RegistryError>;
