use serde::Serialize;

/// Installer command for a freshly issued setup token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupUrlResponse {
    pub url: String,
    /// Pipes the script to a shell with the token in `PULSE_SETUP_TOKEN`
    pub command: String,
    pub command_with_env: String,
    /// The script prompts for the token instead
    pub command_without_env: String,
    pub setup_token: String,
    pub token_hint: String,
    /// Unix seconds
    pub expires: u64,
    /// Same instant as `expires`
    pub expires_at: u64,
}
