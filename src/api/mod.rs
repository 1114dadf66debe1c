//! HTTP surface of the registry.
//!
//! [`router`] exposes the registration engine as JSON endpoints. Tenancy comes from an
//! [`OrgId`](crate::OrgId) request extension inserted by outer middleware, and the
//! peer address from `ConnectInfo<SocketAddr>` when the server is started with
//! `into_make_service_with_connect_info`.

mod error;
pub mod handlers;

pub use error::ErrorResponse;
pub use handlers::{API_TOKEN_HEADER, Tenant};

use crate::registry::application::service::registration_engine::RegistrationEngine;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use std::sync::Arc;

/// Shared state of every handler.
#[derive(Debug)]
pub struct ApiState {
    pub engine: Arc<RegistrationEngine>,
}

/// Builds the registry routes.
pub fn router(engine: Arc<RegistrationEngine>) -> Router {
    let config = engine.config().clone();
    let state = Arc::new(ApiState { engine });

    Router::new()
        .route(
            "/nodes",
            get(handlers::list_nodes)
                .post(handlers::add_node)
                .layer(DefaultBodyLimit::max(config.max_node_body)),
        )
        .route(
            "/nodes/{id}",
            put(handlers::update_node)
                .delete(handlers::delete_node)
                .layer(DefaultBodyLimit::max(config.max_node_body)),
        )
        .route(
            "/nodes/{id}/refresh-cluster",
            post(handlers::refresh_cluster),
        )
        .route("/nodes/{id}/test", post(handlers::test_node))
        .route(
            "/connection/test",
            post(handlers::test_connection).layer(DefaultBodyLimit::max(config.max_node_body)),
        )
        .route(
            "/setup-url",
            post(handlers::setup_url).layer(DefaultBodyLimit::max(config.max_setup_url_body)),
        )
        .route(
            "/auto-register",
            post(handlers::auto_register)
                .layer(DefaultBodyLimit::max(config.max_auto_register_body)),
        )
        .with_state(state)
}
