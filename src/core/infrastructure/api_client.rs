//! Internal HTTP client that handles token or ticket authentication.

use crate::{
    auth::application::service::login_service::LoginService,
    config::ApiClientConfig,
    core::{
        domain::{
            error::UpstreamError,
            model::{
                auth_session::AuthSession, client_config::ClientConfig, node_record::Credentials,
            },
            value_object::NodeKind,
        },
        infrastructure::tls_fingerprint::pinned_client_config,
    },
};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    Client, RequestBuilder, StatusCode,
    header::{AUTHORIZATION, COOKIE},
};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Longest upstream body kept in an error.
const MAX_ERROR_BODY: usize = 512;

/// Proxmox wraps every payload in `{"data": ...}`.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Internal HTTP client for one Proxmox endpoint.
///
/// Token credentials are sent as a `PVEAPIToken` / `PBSAPIToken` / `PMGAPIToken`
/// authorization header. Password credentials are exchanged for a ticket on first use;
/// the ticket travels as the product's auth cookie together with the
/// `CSRFPreventionToken` header. A `401 Unauthorized` answer to a ticket request
/// triggers one re-login and one retry.
#[derive(Debug)]
pub struct ApiClient {
    http_client: Client,
    kind: NodeKind,
    base_url: String,
    credentials: Credentials,
    session: Arc<RwLock<Option<AuthSession>>>,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl ApiClient {
    /// Creates a new `ApiClient`. Password clients start without a ticket.
    ///
    /// A pinned fingerprint takes the place of CA verification, whatever `verify_ssl`
    /// says; otherwise `verify_ssl` toggles the usual chain check.
    ///
    /// # Errors
    /// Returns `UpstreamError::Transport` if the HTTP client cannot be built.
    pub fn new(
        kind: NodeKind,
        config: &ClientConfig,
        settings: &ApiClientConfig,
    ) -> Result<Self, UpstreamError> {
        let builder = Client::builder().timeout(config.timeout);
        let builder = match config.fingerprint.as_deref() {
            Some(expected) => builder.tls_backend_preconfigured(pinned_client_config(expected)?),
            None => builder.danger_accept_invalid_certs(!config.verify_ssl),
        };
        let http_client = builder
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let rate_limiter = settings.rate_limit.and_then(|rl| {
            let per_second = NonZeroU32::new(rl.requests_per_second)?;
            let burst = NonZeroU32::new(rl.burst_size)?;
            let quota = Quota::per_second(per_second).allow_burst(burst);
            Some(Arc::new(DefaultDirectRateLimiter::direct(quota)))
        });

        Ok(Self {
            http_client,
            kind,
            base_url: config.host.trim_end_matches('/').to_string(),
            credentials: config.credentials.clone(),
            session: Arc::new(RwLock::new(None)),
            rate_limiter,
        })
    }

    /// Performs an authenticated GET request and unwraps the `data` envelope.
    ///
    /// # Errors
    /// Returns `UpstreamError` if the request fails, authentication cannot be refreshed,
    /// or the response cannot be parsed.
    pub async fn get<T>(&self, path: &str) -> Result<T, UpstreamError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.execute_request(reqwest::Method::GET, path, None::<&()>)
            .await
    }

    /// Performs an authenticated POST request with a JSON body.
    ///
    /// # Errors
    /// Returns `UpstreamError` if the request fails, authentication cannot be refreshed,
    /// or the response cannot be parsed.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, UpstreamError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        self.execute_request(reqwest::Method::POST, path, Some(body))
            .await
    }

    /// Performs an authenticated PUT request with a JSON body.
    ///
    /// # Errors
    /// Returns `UpstreamError` if the request fails, authentication cannot be refreshed,
    /// or the response cannot be parsed.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T, UpstreamError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        self.execute_request(reqwest::Method::PUT, path, Some(body))
            .await
    }

    /// Core request execution method. Sends the request, re-logs in once on 401 for
    /// ticket sessions, and unwraps the response envelope.
    async fn execute_request<B, T>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, UpstreamError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/api2/json/{}", self.base_url, path.trim_start_matches('/'));
        let mut refreshed = false;

        loop {
            if let Some(limiter) = &self.rate_limiter {
                limiter.until_ready().await;
            }

            let mut request = self.http_client.request(method.clone(), &url);
            request = self.authorize(request).await?;
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && !refreshed && self.uses_ticket() {
                tracing::debug!(url = %url, "ticket rejected, logging in again");
                self.refresh_session().await?;
                refreshed = true;
                continue;
            }

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(UpstreamError::Status {
                    status: status.as_u16(),
                    message: error_message(status, &text),
                });
            }

            let envelope = response
                .json::<Envelope<T>>()
                .await
                .map_err(|e| UpstreamError::Decode(format!("{}: {}", path, e)))?;
            return Ok(envelope.data);
        }
    }

    fn uses_ticket(&self) -> bool {
        matches!(self.credentials, Credentials::Password { .. })
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, UpstreamError> {
        match &self.credentials {
            Credentials::Token {
                token_id,
                token_value,
            } => Ok(request.header(
                AUTHORIZATION,
                token_header(self.kind, token_id, token_value),
            )),
            Credentials::Password { .. } => {
                self.ensure_session().await?;
                let guard = self.session.read().await;
                let Some(session) = guard.as_ref() else {
                    return Ok(request);
                };
                let mut request = request.header(
                    COOKIE,
                    format!("{}={}", self.kind.auth_cookie_name(), session.ticket()),
                );
                if let Some(csrf) = session.csrf_token() {
                    request = request.header("CSRFPreventionToken", csrf);
                }
                Ok(request)
            }
        }
    }

    async fn ensure_session(&self) -> Result<(), UpstreamError> {
        let missing = self.session.read().await.is_none();
        if missing {
            self.refresh_session().await?;
        }
        Ok(())
    }

    /// Performs a fresh login using the stored credentials to obtain a new ticket.
    async fn refresh_session(&self) -> Result<(), UpstreamError> {
        let Credentials::Password { user, password } = &self.credentials else {
            return Ok(());
        };
        let session = LoginService::new()
            .execute(&self.http_client, &self.base_url, user, password)
            .await?;
        *self.session.write().await = Some(session);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn set_session(&self, session: AuthSession) {
        *self.session.write().await = Some(session);
    }
}

/// `Authorization` header value for an API token.
fn token_header(kind: NodeKind, token_id: &str, token_value: &str) -> String {
    match kind {
        NodeKind::Pve => format!("PVEAPIToken={}={}", token_id, token_value),
        NodeKind::Pbs => format!("PBSAPIToken={}:{}", token_id, token_value),
        NodeKind::Pmg => format!("PMGAPIToken={}:{}", token_id, token_value),
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("error");
    let body = body.trim();
    if body.is_empty() {
        return reason.to_string();
    }
    let mut cut = body.len().min(MAX_ERROR_BODY);
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}: {}", reason, &body[..cut])
}
