//! Node onboarding and registration for Proxmox VE, Backup Server and Mail Gateway
//! fleets.
//!
//! The [`RegistrationEngine`] owns every change to an organization's node inventory:
//! operator adds and edits, cluster discovery, and self-registration by installer
//! scripts and host agents that authenticate with one-time setup tokens or scoped API
//! tokens. [`api::router`] exposes it over HTTP.
//!
//! Persistence, the monitor that polls the nodes and UI fan-out are collaborators
//! behind the traits in [`contract`]; [`JsonFileStore`], [`MemoryStore`] and
//! [`NullMonitor`] cover simple embeddings.

pub mod api;
mod auth;
pub mod config;
mod core;
mod registry;

#[cfg(test)]
mod tests;

pub use crate::auth::application::service::{
    api_token_service::{
        ApiTokenGrant, ApiTokenRegistry, SCOPE_HOST_AGENT_REPORT, SCOPE_SETTINGS_WRITE,
    },
    setup_token_service::{IssuedSetupToken, SetupTokenGrant, SetupTokenRejection, SetupTokenStore},
};
pub use crate::config::{ApiClientConfig, ProbeSettings, RateLimitConfig, RegistryConfig};
pub use crate::core::domain::{
    contract,
    error::{
        RegistryError, RegistryResult, TlsFailure, UnauthorizedReason, UpstreamError,
        UpstreamOperation, ValidationError,
    },
    model::{
        alert_config::AlertConfig,
        client_config::ClientConfig,
        cluster_detection::ClusterDetection,
        cluster_endpoint::ClusterEndpoint,
        events::{EventPayload, RegistryEvent},
        inventory::NodeInventory,
        node_record::{Credentials, NodeDetails, NodeRecord, NodeSource},
    },
    value_object::{NodeHost, NodeId, NodeKind, OrgId},
};
pub use crate::core::domain::contract::{NullMonitor, TenantContext};
pub use crate::core::infrastructure::{
    dns_resolver::DnsResolver, file_store::JsonFileStore, memory_store::MemoryStore,
    proxmox_clients::HttpClientFactory, static_tenants::StaticTenants,
    tls_fingerprint::TlsFingerprintFetcher,
};
pub use crate::registry::application::{
    request::{
        auto_register_request::AutoRegisterRequest, node_config_request::NodeConfigRequest,
        setup_url_request::SetupUrlRequest,
    },
    response::{
        add_node_response::{AddNodeOutcome, ClusterMergeResponse},
        auto_register_response::{AutoRegisterOutcome, AutoRegisterResponse},
        cluster_refresh_response::ClusterRefreshResponse,
        connection_test_response::ConnectionTestResponse,
        node_response::NodeResponse,
        setup_url_response::SetupUrlResponse,
    },
    service::{
        admission::AutoRegisterCall,
        cluster_probe::PveClusterProbe,
        registration_engine::{RegistrationEngine, RegistrationEngineBuilder},
    },
};
