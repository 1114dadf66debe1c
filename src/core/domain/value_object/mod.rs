mod network;
mod node_host;
mod node_id;
mod node_kind;
mod org_id;
mod proxmox_port;
mod proxmox_username;
pub mod serde_helpers;
mod setup_token_format;

pub use network::{extract_ip, ips_on_same_network, resolve_ip};
pub use node_host::{NodeHost, hostname_of};
pub use node_id::NodeId;
pub use node_kind::NodeKind;
pub use org_id::OrgId;
pub use proxmox_username::normalize_username;
pub use setup_token_format::token_hint;

// Re-export validation functions for internal use
pub(crate) use proxmox_port::parse_port;
pub(crate) use proxmox_username::validate_username;
pub(crate) use setup_token_format::validate_token_format;
