use crate::{
    core::domain::{
        error::{RegistryResult, ValidationError},
        value_object::{NodeKind, OrgId, token_hint},
    },
    registry::application::{
        request::setup_url_request::SetupUrlRequest,
        response::setup_url_response::SetupUrlResponse,
        service::registration_engine::RegistrationEngine,
    },
};
use std::time::UNIX_EPOCH;
use url::form_urlencoded;

impl RegistrationEngine {
    /// Issues a setup token and the installer command that carries it.
    ///
    /// `base_url` is the externally reachable address of this service; the configured
    /// public URL takes precedence when set.
    ///
    /// # Errors
    /// `Validation` for an unknown node type.
    pub fn issue_setup_url(
        &self,
        org: &OrgId,
        request: &SetupUrlRequest,
        base_url: &str,
    ) -> RegistryResult<SetupUrlResponse> {
        let kind: NodeKind = request.node_type.parse()?;
        let pulse_url = self
            .config
            .public_url
            .as_deref()
            .unwrap_or(base_url)
            .trim()
            .trim_end_matches('/');
        if pulse_url.is_empty() {
            return Err(ValidationError::field("pulse_url", "Service URL is unknown").into());
        }

        let host = request.host.trim();
        let issued = self.setup_tokens.issue(kind, host, org);

        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("type", kind.as_str());
        if !host.is_empty() {
            query.append_pair("host", host);
        }
        query.append_pair("pulse_url", pulse_url);
        if request.backup_perms {
            query.append_pair("backup_perms", "true");
        }
        let url = format!("{pulse_url}/api/setup-script?{}", query.finish());

        let command = format!(
            r#"curl -sSL "{url}" | PULSE_SETUP_TOKEN={} bash"#,
            issued.token
        );
        let expires = issued
            .expires_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Ok(SetupUrlResponse {
            command_without_env: format!(r#"curl -sSL "{url}" | bash"#),
            command_with_env: command.clone(),
            command,
            url,
            token_hint: token_hint(&issued.token),
            setup_token: issued.token,
            expires,
            expires_at: expires,
        })
    }
}
