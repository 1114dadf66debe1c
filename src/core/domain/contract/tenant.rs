use crate::core::domain::{
    contract::{AlertConfigStore, Monitor, NodeStore},
    error::RegistryResult,
    value_object::OrgId,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Per-organization collaborators.
#[derive(Clone)]
pub struct TenantContext {
    pub store: Arc<dyn NodeStore>,
    pub alerts: Arc<dyn AlertConfigStore>,
    pub monitor: Arc<dyn Monitor>,
}

impl TenantContext {
    pub fn new(
        store: Arc<dyn NodeStore>,
        alerts: Arc<dyn AlertConfigStore>,
        monitor: Arc<dyn Monitor>,
    ) -> Self {
        Self {
            store,
            alerts,
            monitor,
        }
    }
}

impl std::fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantContext").finish_non_exhaustive()
    }
}

/// Maps an organization to its collaborators.
#[async_trait]
pub trait TenantProvider: Send + Sync {
    /// # Errors
    /// `RegistryError::NotFound` for an unknown organization.
    async fn resolve(&self, org: &OrgId) -> RegistryResult<TenantContext>;
}
