//! One-time setup tokens for installer scripts.

use crate::core::domain::value_object::{NodeKind, OrgId, validate_token_format};
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const TOKEN_BYTES: usize = 16;

/// A freshly issued token. The raw value is never stored and is only available here.
#[derive(Clone)]
pub struct IssuedSetupToken {
    pub token: String,
    pub expires_at: SystemTime,
    pub expires_in: Duration,
}

impl std::fmt::Debug for IssuedSetupToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSetupToken")
            .field("token", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Successful validation: the organization the token was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupTokenGrant {
    pub org_id: OrgId,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupTokenRejection {
    #[error("token is not a well-formed hex string")]
    Malformed,
    #[error("token is unknown")]
    Unknown,
    #[error("token has expired")]
    Expired,
    #[error("token was already used")]
    AlreadyUsed,
    #[error("token was issued for another node type")]
    KindMismatch,
}

#[derive(Debug)]
struct PendingToken {
    expires_at: Instant,
    used: bool,
    kind: NodeKind,
    host: String,
    org_id: OrgId,
}

#[derive(Debug)]
struct GraceEntry {
    expires_at: Instant,
    kind: NodeKind,
    org_id: OrgId,
}

#[derive(Debug, Default)]
struct TokenTables {
    pending: HashMap<String, PendingToken>,
    grace: HashMap<String, GraceEntry>,
}

/// Issues and consumes setup tokens.
///
/// Only SHA-256 hashes of tokens are kept. A consumed token stays acceptable for a short
/// grace window (never past its original expiry) so a script retry that races the
/// monitor reload still succeeds.
#[derive(Debug)]
pub struct SetupTokenStore {
    tables: Mutex<TokenTables>,
    ttl: Duration,
    grace: Duration,
}

impl SetupTokenStore {
    pub fn new(ttl: Duration, grace: Duration) -> Self {
        Self {
            tables: Mutex::new(TokenTables::default()),
            ttl,
            grace,
        }
    }

    /// Generates a 32-character hex token bound to `kind` and `org_id`.
    pub fn issue(&self, kind: NodeKind, host: &str, org_id: &OrgId) -> IssuedSetupToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let hash = hash_token(&token);

        tracing::info!(
            token_hash = &hash[..8],
            %kind,
            host,
            org_id = %org_id,
            "issued setup token"
        );
        self.tables.lock().pending.insert(
            hash,
            PendingToken {
                expires_at: Instant::now() + self.ttl,
                used: false,
                kind,
                host: host.to_string(),
                org_id: org_id.clone(),
            },
        );

        IssuedSetupToken {
            token,
            expires_at: SystemTime::now() + self.ttl,
            expires_in: self.ttl,
        }
    }

    /// Consumes `raw` for a registration of `kind`.
    ///
    /// A kind mismatch leaves the token untouched.
    ///
    /// # Errors
    /// The [`SetupTokenRejection`] that explains the refusal.
    pub fn validate(
        &self,
        raw: &str,
        kind: NodeKind,
    ) -> Result<SetupTokenGrant, SetupTokenRejection> {
        validate_token_format(raw).map_err(|_| SetupTokenRejection::Malformed)?;
        let hash = hash_token(raw);
        let now = Instant::now();
        let mut tables = self.tables.lock();
        let TokenTables { pending, grace } = &mut *tables;

        if let Some(token) = pending.get_mut(&hash) {
            if token.kind != kind {
                tracing::warn!(
                    token_hash = &hash[..8],
                    issued_for = %token.kind,
                    presented = %kind,
                    "setup token presented for another node type"
                );
                return Err(SetupTokenRejection::KindMismatch);
            }
            if now >= token.expires_at {
                return Err(SetupTokenRejection::Expired);
            }
            if !token.used {
                token.used = true;
                let grace_until = token.expires_at.min(now + self.grace);
                grace.insert(
                    hash.clone(),
                    GraceEntry {
                        expires_at: grace_until,
                        kind,
                        org_id: token.org_id.clone(),
                    },
                );
                tracing::info!(token_hash = &hash[..8], host = %token.host, "setup token consumed");
                return Ok(SetupTokenGrant {
                    org_id: token.org_id.clone(),
                });
            }
        }

        match grace.get(&hash) {
            Some(entry) if entry.kind != kind => Err(SetupTokenRejection::KindMismatch),
            Some(entry) if now < entry.expires_at => {
                tracing::debug!(token_hash = &hash[..8], "setup token accepted within grace window");
                Ok(SetupTokenGrant {
                    org_id: entry.org_id.clone(),
                })
            }
            Some(_) => Err(SetupTokenRejection::AlreadyUsed),
            None if pending.contains_key(&hash) => Err(SetupTokenRejection::AlreadyUsed),
            None => Err(SetupTokenRejection::Unknown),
        }
    }

    /// Whether `raw` would currently be accepted, without consuming it.
    pub fn peek(&self, raw: &str) -> bool {
        if validate_token_format(raw).is_err() {
            return false;
        }
        let hash = hash_token(raw);
        let now = Instant::now();
        let tables = self.tables.lock();
        let pending = tables
            .pending
            .get(&hash)
            .is_some_and(|token| !token.used && now < token.expires_at);
        pending
            || tables
                .grace
                .get(&hash)
                .is_some_and(|entry| now < entry.expires_at)
    }

    /// Drops expired or consumed tokens and expired grace entries.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut tables = self.tables.lock();
        let before = tables.pending.len() + tables.grace.len();
        tables
            .pending
            .retain(|_, token| !token.used && now < token.expires_at);
        tables.grace.retain(|_, entry| now < entry.expires_at);
        let removed = before - (tables.pending.len() + tables.grace.len());
        if removed > 0 {
            tracing::debug!(removed, "swept setup tokens");
        }
        removed
    }

    /// Runs [`sweep`](Self::sweep) every `period` until the handle is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        let tables = self.tables.lock();
        tables.pending.len() + tables.grace.len()
    }
}

impl Default for SetupTokenStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5 * 60), Duration::from_secs(60))
    }
}

fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> OrgId {
        OrgId::new("acme")
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_lifecycle_with_grace() {
        let store = SetupTokenStore::default();
        let issued = store.issue(NodeKind::Pve, "10.0.0.1", &org());
        assert_eq!(issued.token.len(), 32);

        let grant = store.validate(&issued.token, NodeKind::Pve).unwrap();
        assert_eq!(grant.org_id, org());
        // Retry inside the grace window.
        assert!(store.validate(&issued.token, NodeKind::Pve).is_ok());

        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(
            store.validate(&issued.token, NodeKind::Pve),
            Err(SetupTokenRejection::AlreadyUsed)
        );
        assert!(!store.peek(&issued.token));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kind_mismatch_keeps_token_unused() {
        let store = SetupTokenStore::default();
        let issued = store.issue(NodeKind::Pve, "10.0.0.1", &org());

        assert_eq!(
            store.validate(&issued.token, NodeKind::Pbs),
            Err(SetupTokenRejection::KindMismatch)
        );
        assert!(store.peek(&issued.token));
        assert!(store.validate(&issued.token, NodeKind::Pve).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_rejected() {
        let store = SetupTokenStore::default();
        let issued = store.issue(NodeKind::Pbs, "backup", &org());
        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        assert_eq!(
            store.validate(&issued.token, NodeKind::Pbs),
            Err(SetupTokenRejection::Expired)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_never_outlives_expiry() {
        let store = SetupTokenStore::new(Duration::from_secs(30), Duration::from_secs(60));
        let issued = store.issue(NodeKind::Pmg, "mail", &org());
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(store.validate(&issued.token, NodeKind::Pmg).is_ok());

        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(store.validate(&issued.token, NodeKind::Pmg).is_err());
    }

    #[tokio::test]
    async fn test_format_checks() {
        let store = SetupTokenStore::default();
        assert_eq!(
            store.validate(&"a".repeat(31), NodeKind::Pve),
            Err(SetupTokenRejection::Malformed)
        );
        assert_eq!(
            store.validate(&"a".repeat(32), NodeKind::Pve),
            Err(SetupTokenRejection::Unknown)
        );
        assert_eq!(
            store.validate("zz not hex", NodeKind::Pve),
            Err(SetupTokenRejection::Malformed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_used_and_expired() {
        let store = SetupTokenStore::default();
        let used = store.issue(NodeKind::Pve, "a", &org());
        let _stale = store.issue(NodeKind::Pve, "b", &org());
        store.validate(&used.token, NodeKind::Pve).unwrap();
        assert_eq!(store.len(), 3);

        // The consumed token moves to the grace table.
        assert_eq!(store.sweep(), 1);
        // Still acceptable from the grace table alone.
        assert!(store.validate(&used.token, NodeKind::Pve).is_ok());

        tokio::time::advance(Duration::from_secs(6 * 60)).await;
        store.sweep();
        assert_eq!(store.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_runs_periodically() {
        let store = Arc::new(SetupTokenStore::new(
            Duration::from_secs(10),
            Duration::from_secs(5),
        ));
        store.issue(NodeKind::Pve, "a", &org());
        let handle = store.clone().spawn_sweeper(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.len(), 0);
        handle.abort();
    }
}
