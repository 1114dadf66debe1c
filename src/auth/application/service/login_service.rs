use crate::{
    auth::application::{
        request::login_request::LoginRequest, response::login_response::LoginResponse,
    },
    core::domain::{error::UpstreamError, model::auth_session::AuthSession},
};

use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue},
};

/// Exchanges a user name and password for a ticket on any Proxmox product.
pub struct LoginService {
    default_headers: HeaderMap,
}

impl LoginService {
    pub fn new() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Self { default_headers }
    }

    /// Logs in against `{base_url}/api2/json/access/ticket`.
    ///
    /// # Errors
    /// `UpstreamError::Status` with the response code for rejected logins, transport
    /// and decode errors otherwise.
    pub async fn execute(
        &self,
        http_client: &Client,
        base_url: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthSession, UpstreamError> {
        let url = build_login_url(base_url);
        let request = LoginRequest { username, password };
        let response = http_client
            .post(&url)
            .headers(self.default_headers.clone())
            .json(&request)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => self.handle_successful_login(response).await,
            StatusCode::UNAUTHORIZED => Err(UpstreamError::Status {
                status: 401,
                message: "Invalid credentials provided".to_string(),
            }),
            StatusCode::BAD_REQUEST => Err(UpstreamError::Status {
                status: 400,
                message: "Invalid login request format".to_string(),
            }),
            StatusCode::NOT_FOUND => Err(UpstreamError::Status {
                status: 404,
                message: "Login endpoint not found".to_string(),
            }),
            StatusCode::SERVICE_UNAVAILABLE => Err(UpstreamError::Status {
                status: 503,
                message: "Proxmox service is currently unavailable".to_string(),
            }),
            status => Err(UpstreamError::Status {
                status: status.as_u16(),
                message: format!("Unexpected login response status: {}", status),
            }),
        }
    }

    async fn handle_successful_login(
        &self,
        response: reqwest::Response,
    ) -> Result<AuthSession, UpstreamError> {
        let login_response = response.json::<LoginResponse>().await.map_err(|e| {
            UpstreamError::Decode(format!("Failed to parse login response: {}", e))
        })?;

        if login_response.data.ticket.is_empty() {
            return Err(UpstreamError::Decode(
                "Login response did not contain a ticket".to_string(),
            ));
        }

        Ok(AuthSession::new(
            login_response.data.ticket,
            login_response.data.csrf_token,
        ))
    }
}

impl Default for LoginService {
    fn default() -> Self {
        Self::new()
    }
}

fn build_login_url(base_url: &str) -> String {
    format!("{}/api2/json/access/ticket", base_url.trim_end_matches('/'))
}
