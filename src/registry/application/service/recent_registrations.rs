use crate::core::domain::value_object::{NodeKind, OrgId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Nodes auto-registered in the last few minutes, shown as connected until the monitor
/// has polled them once.
#[derive(Debug)]
pub struct RecentRegistrations {
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl RecentRegistrations {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn mark(&self, org: &OrgId, kind: NodeKind, name: &str) {
        self.entries
            .lock()
            .insert(key(org, kind, name), Instant::now());
    }

    /// Expired entries are dropped on read.
    pub fn is_recent(&self, org: &OrgId, kind: NodeKind, name: &str) -> bool {
        let key = key(org, kind, name);
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(at) if at.elapsed() < self.ttl => true,
            Some(_) => {
                entries.remove(&key);
                false
            }
            None => false,
        }
    }

    pub fn clear(&self, org: &OrgId, kind: NodeKind, name: &str) {
        self.entries.lock().remove(&key(org, kind, name));
    }
}

fn key(org: &OrgId, kind: NodeKind, name: &str) -> String {
    format!("{org}/{kind}:{name}")
}
