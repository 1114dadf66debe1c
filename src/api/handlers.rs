use crate::{
    api::ApiState,
    core::domain::{
        error::{RegistryError, ValidationError},
        value_object::OrgId,
    },
    registry::application::{
        request::{node_config_request::NodeConfigRequest, setup_url_request::SetupUrlRequest},
        response::{
            add_node_response::AddNodeOutcome, auto_register_response::AutoRegisterOutcome,
            cluster_refresh_response::ClusterRefreshResponse,
            connection_test_response::ConnectionTestResponse, node_response::NodeResponse,
            setup_url_response::SetupUrlResponse,
        },
        service::admission::AutoRegisterCall,
    },
};
use axum::{
    Json,
    extract::{ConnectInfo, FromRequestParts, Path, Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

pub const API_TOKEN_HEADER: &str = "x-api-token";

/// Organization of the request, set as an [`OrgId`] extension by outer middleware.
/// Requests without one belong to the default organization.
#[derive(Debug, Clone)]
pub struct Tenant(pub OrgId);

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Tenant(
            parts.extensions.get::<OrgId>().cloned().unwrap_or_default(),
        ))
    }
}

pub async fn list_nodes(
    State(state): State<Arc<ApiState>>,
    Tenant(org): Tenant,
) -> Result<Json<Vec<NodeResponse>>, RegistryError> {
    Ok(Json(state.engine.list(&org).await?))
}

pub async fn add_node(
    State(state): State<Arc<ApiState>>,
    Tenant(org): Tenant,
    Json(request): Json<NodeConfigRequest>,
) -> Result<Response, RegistryError> {
    Ok(match state.engine.add(&org, request).await? {
        AddNodeOutcome::Created(node) => (StatusCode::CREATED, Json(node)).into_response(),
        AddNodeOutcome::Merged(merge) => (StatusCode::OK, Json(merge)).into_response(),
    })
}

pub async fn update_node(
    State(state): State<Arc<ApiState>>,
    Tenant(org): Tenant,
    Path(id): Path<String>,
    Json(request): Json<NodeConfigRequest>,
) -> Result<Json<NodeResponse>, RegistryError> {
    Ok(Json(state.engine.update(&org, &id, request).await?))
}

pub async fn delete_node(
    State(state): State<Arc<ApiState>>,
    Tenant(org): Tenant,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, RegistryError> {
    state.engine.delete(&org, &id).await?;
    Ok(Json(json!({ "status": "success" })))
}

pub async fn refresh_cluster(
    State(state): State<Arc<ApiState>>,
    Tenant(org): Tenant,
    Path(id): Path<String>,
) -> Result<Json<ClusterRefreshResponse>, RegistryError> {
    Ok(Json(state.engine.refresh_cluster(&org, &id).await?))
}

pub async fn test_node(
    State(state): State<Arc<ApiState>>,
    Tenant(org): Tenant,
    Path(id): Path<String>,
) -> Result<Json<ConnectionTestResponse>, RegistryError> {
    Ok(Json(state.engine.test_node(&org, &id).await?))
}

pub async fn test_connection(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<NodeConfigRequest>,
) -> Result<Json<ConnectionTestResponse>, RegistryError> {
    Ok(Json(state.engine.test_connection(&request).await?))
}

pub async fn setup_url(
    State(state): State<Arc<ApiState>>,
    Tenant(org): Tenant,
    headers: HeaderMap,
    Json(request): Json<SetupUrlRequest>,
) -> Result<Json<SetupUrlResponse>, RegistryError> {
    let base_url = request_base_url(&headers);
    Ok(Json(
        state
            .engine
            .issue_setup_url(&org, &request, &base_url)?,
    ))
}

pub async fn auto_register(
    State(state): State<Arc<ApiState>>,
    request: Request,
) -> Result<Json<AutoRegisterOutcome>, RegistryError> {
    let (parts, body) = request.into_parts();
    let limit = state.engine.config().max_auto_register_body;
    let body = axum::body::to_bytes(body, limit).await.map_err(|e| {
        tracing::warn!(error = %e, "failed to read auto-register body");
        RegistryError::Validation(ValidationError::Format(
            "Failed to read request body".to_string(),
        ))
    })?;

    let call = AutoRegisterCall {
        body: &body,
        api_token: header_str(&parts.headers, API_TOKEN_HEADER),
        peer: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip()),
        forwarded_for: header_str(&parts.headers, "x-forwarded-for"),
        org: parts.extensions.get::<OrgId>().cloned().unwrap_or_default(),
    };
    Ok(Json(state.engine.admit_auto_register(call).await?))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// `<proto>://<host>` as the caller reached this service.
fn request_base_url(headers: &HeaderMap) -> String {
    let proto = header_str(headers, "x-forwarded-proto")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("http");
    match header_str(headers, header::HOST.as_str()) {
        Some(host) => format!("{proto}://{host}"),
        None => String::new(),
    }
}
