use serde::Deserialize;

/// Body posted by the installer script or a host agent.
#[derive(Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoRegisterRequest {
    #[serde(rename = "type")]
    pub node_type: String,
    pub host: String,
    /// Full token ID, e.g. `pulse-monitor@pam!pulse-1`
    pub token_id: String,
    pub token_value: String,
    /// Host name the node reports for itself
    pub server_name: String,
    /// Older scripts send the setup token here
    pub setup_code: String,
    pub auth_token: String,
    /// `agent` or `script`
    pub source: String,
    /// Ask the registry to mint the monitoring token with `username`/`password`
    pub request_token: bool,
    pub username: String,
    /// Used once to create the token, never stored
    pub password: String,
}

impl AutoRegisterRequest {
    /// The credential presented in the body: `authToken` wins over `setupCode`.
    pub(crate) fn presented_token(&self) -> Option<&str> {
        [self.auth_token.trim(), self.setup_code.trim()]
            .into_iter()
            .find(|token| !token.is_empty())
    }
}

impl std::fmt::Debug for AutoRegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoRegisterRequest")
            .field("node_type", &self.node_type)
            .field("host", &self.host)
            .field("token_id", &self.token_id)
            .field("has_token", &!self.token_value.is_empty())
            .field("server_name", &self.server_name)
            .field("source", &self.source)
            .field("request_token", &self.request_token)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
