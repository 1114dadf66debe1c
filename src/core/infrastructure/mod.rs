pub mod api_client;
pub mod dns_resolver;
pub mod file_store;
pub mod memory_store;
pub mod proxmox_clients;
pub mod static_tenants;
pub mod tls_fingerprint;
