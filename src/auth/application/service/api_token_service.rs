//! Long-lived API tokens accepted by the auto-register endpoint.

use crate::core::domain::value_object::OrgId;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Lets a host agent report itself.
pub const SCOPE_HOST_AGENT_REPORT: &str = "host-agent:report";
/// Full settings access; implies every narrower scope.
pub const SCOPE_SETTINGS_WRITE: &str = "settings:write";

#[derive(Debug, Clone)]
struct ApiTokenRecord {
    scopes: Vec<String>,
    org_id: Option<OrgId>,
}

/// A token that passed the scope check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiTokenGrant {
    /// Organization the token is bound to; `None` for instance-wide tokens
    pub org_id: Option<OrgId>,
}

/// Hash-indexed table of configured API tokens.
#[derive(Debug, Default)]
pub struct ApiTokenRegistry {
    tokens: RwLock<HashMap<String, ApiTokenRecord>>,
}

impl ApiTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<I, S>(&self, raw: &str, scopes: I, org_id: Option<OrgId>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let record = ApiTokenRecord {
            scopes: scopes.into_iter().map(Into::into).collect(),
            org_id,
        };
        self.tokens.write().insert(hash_token(raw), record);
    }

    pub fn revoke(&self, raw: &str) -> bool {
        self.tokens.write().remove(&hash_token(raw)).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }

    /// Accepts `raw` when it is registered with any of `scopes`.
    pub fn authorize(&self, raw: &str, scopes: &[&str]) -> Option<ApiTokenGrant> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let tokens = self.tokens.read();
        let record = tokens.get(&hash_token(raw))?;
        let allowed = record
            .scopes
            .iter()
            .any(|scope| scope == "*" || scopes.contains(&scope.as_str()));
        if !allowed {
            tracing::debug!(?scopes, "API token lacks required scope");
            return None;
        }
        Some(ApiTokenGrant {
            org_id: record.org_id.clone(),
        })
    }
}

fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}
