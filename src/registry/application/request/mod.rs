pub mod auto_register_request;
pub mod node_config_request;
pub mod setup_url_request;
