pub mod add_node_response;
pub mod auto_register_response;
pub mod cluster_refresh_response;
pub mod connection_test_response;
pub mod node_response;
pub mod setup_url_response;
