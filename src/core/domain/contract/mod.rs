//! Interfaces of the collaborators the registry drives but does not own.

mod cluster;
mod monitor;
mod proxmox;
mod store;
mod tenant;

pub use cluster::ClusterProbe;
pub use monitor::{EventBroadcaster, Monitor, NodeStatus, NullBroadcaster, NullMonitor};
pub use proxmox::{ClientFactory, FingerprintFetcher, HostResolver, PbsApi, PmgApi, PveApi};
pub use store::{AlertConfigStore, NodeStore};
pub use tenant::{TenantContext, TenantProvider};

#[cfg(test)]
pub use cluster::MockClusterProbe;
#[cfg(test)]
pub use proxmox::{MockFingerprintFetcher, MockHostResolver};
