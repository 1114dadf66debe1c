use crate::core::domain::{
    contract::{TenantContext, TenantProvider},
    error::{RegistryError, RegistryResult},
    value_object::OrgId,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Fixed organization table built at startup.
#[derive(Debug, Default, Clone)]
pub struct StaticTenants {
    tenants: HashMap<OrgId, TenantContext>,
}

impl StaticTenants {
    /// Single-tenant deployment: everything belongs to the default organization.
    pub fn single(context: TenantContext) -> Self {
        Self::default().with_tenant(OrgId::default(), context)
    }

    #[must_use]
    pub fn with_tenant(mut self, org: OrgId, context: TenantContext) -> Self {
        self.tenants.insert(org, context);
        self
    }
}

#[async_trait]
impl TenantProvider for StaticTenants {
    async fn resolve(&self, org: &OrgId) -> RegistryResult<TenantContext> {
        self.tenants
            .get(org)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("organization {org}")))
    }
}
