pub mod alert_config;
pub mod auth_session;
pub mod client_config;
pub mod cluster_detection;
pub mod cluster_endpoint;
pub mod events;
pub mod inventory;
pub mod node_list_item;
pub mod node_record;
pub mod proxmox_api;
