//! Authentication gate in front of auto-registration.

use crate::{
    auth::application::service::api_token_service::{SCOPE_HOST_AGENT_REPORT, SCOPE_SETTINGS_WRITE},
    core::domain::{
        error::{RegistryError, RegistryResult, UnauthorizedReason, ValidationError},
        value_object::{NodeKind, OrgId},
    },
    registry::application::{
        request::auto_register_request::AutoRegisterRequest,
        response::auto_register_response::AutoRegisterOutcome,
        service::registration_engine::RegistrationEngine,
    },
};
use std::net::IpAddr;

const ADMISSION_SCOPES: &[&str] = &[SCOPE_HOST_AGENT_REPORT, SCOPE_SETTINGS_WRITE];

/// A raw auto-register call as it arrived on the wire.
#[derive(Debug, Clone)]
pub struct AutoRegisterCall<'a> {
    pub body: &'a [u8],
    /// Value of the `X-API-Token` header
    pub api_token: Option<&'a str>,
    /// Address of the immediate peer
    pub peer: Option<IpAddr>,
    /// Value of the `X-Forwarded-For` header
    pub forwarded_for: Option<&'a str>,
    /// Organization of the request context, used unless a token names another one
    pub org: OrgId,
}

impl RegistrationEngine {
    /// Parses, authenticates and dispatches an auto-register call.
    ///
    /// The `X-API-Token` header is checked first, then the `authToken`/`setupCode`
    /// body field as an API token and finally as a one-time setup token for the
    /// requested node type. A setup token or an organization-bound API token moves
    /// the call into that token's organization.
    ///
    /// # Errors
    /// `Validation` for an oversized or malformed body, `Unauthorized` when no
    /// credential was presented or none was accepted, plus whatever the registration
    /// itself returns.
    pub async fn admit_auto_register(
        &self,
        call: AutoRegisterCall<'_>,
    ) -> RegistryResult<AutoRegisterOutcome> {
        if call.body.len() > self.config.max_auto_register_body {
            return Err(ValidationError::ConstraintViolation(format!(
                "Request body exceeds {} bytes",
                self.config.max_auto_register_body
            ))
            .into());
        }
        let request: AutoRegisterRequest = serde_json::from_slice(call.body).map_err(|e| {
            tracing::error!(error = %e, "failed to parse auto-register request");
            ValidationError::Format("Invalid request format".to_string())
        })?;

        let org = self
            .authenticate(&call, &request)?
            .unwrap_or_else(|| call.org.clone());
        let client_ip = client_ip(
            call.peer,
            call.forwarded_for,
            |peer| self.config.is_trusted_proxy(peer),
        );
        tracing::info!(
            client_ip = client_ip.as_deref().unwrap_or("unknown"),
            org_id = %org,
            "auto-register request admitted"
        );

        if request.request_token {
            self.register_with_credentials(&org, request).await
        } else {
            self.auto_register(&org, request).await
        }
    }

    /// Organization granted by the accepted credential, `None` to keep the caller's.
    fn authenticate(
        &self,
        call: &AutoRegisterCall<'_>,
        request: &AutoRegisterRequest,
    ) -> RegistryResult<Option<OrgId>> {
        let header = call.api_token.map(str::trim).filter(|t| !t.is_empty());
        if let Some(grant) = header.and_then(|t| self.api_tokens.authorize(t, ADMISSION_SCOPES)) {
            tracing::info!("auto-register authenticated via API token header");
            return Ok(grant.org_id);
        }

        let presented = request.presented_token();
        if let Some(raw) = presented {
            if let Some(grant) = self.api_tokens.authorize(raw, ADMISSION_SCOPES) {
                tracing::info!(node_type = %request.node_type, "auto-register authenticated via direct API token");
                return Ok(grant.org_id);
            }

            match request.node_type.parse::<NodeKind>() {
                Ok(kind) => match self.setup_tokens.validate(raw, kind) {
                    Ok(grant) => {
                        tracing::info!(%kind, host = %request.host, "auto-register authenticated via setup token");
                        return Ok(Some(grant.org_id));
                    }
                    Err(rejection) => {
                        tracing::warn!(%kind, reason = %rejection, "setup token rejected");
                    }
                },
                Err(_) => {
                    tracing::warn!(node_type = %request.node_type, "setup token presented with unknown node type");
                }
            }
        }

        let reason = if header.is_none() && presented.is_none() {
            UnauthorizedReason::Missing
        } else {
            UnauthorizedReason::Invalid
        };
        tracing::warn!(peer = ?call.peer, %reason, "unauthorized auto-register attempt rejected");
        Err(RegistryError::Unauthorized(reason))
    }
}

/// The address to audit a call under.
///
/// `X-Forwarded-For` is honored only when the immediate peer is a trusted proxy; its
/// first entry is the original client.
fn client_ip(
    peer: Option<IpAddr>,
    forwarded_for: Option<&str>,
    trusted: impl Fn(IpAddr) -> bool,
) -> Option<String> {
    let peer = peer?;
    if trusted(peer) {
        let forwarded = forwarded_for
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(forwarded) = forwarded {
            return Some(forwarded.to_string());
        }
    }
    Some(peer.to_string())
}
