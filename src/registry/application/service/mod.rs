pub mod admission;
pub mod auto_register_service;
pub mod cluster_probe;
pub mod node_service;
pub mod probe_cooldown;
pub mod recent_registrations;
pub mod registration_engine;
pub mod setup_url;
