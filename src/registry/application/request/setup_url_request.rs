use serde::Deserialize;

/// Operator request for an installer command.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetupUrlRequest {
    #[serde(rename = "type")]
    pub node_type: String,
    /// Host the script will run on, passed through to the script
    pub host: String,
    /// Grant the monitoring user backup read permissions
    pub backup_perms: bool,
}
