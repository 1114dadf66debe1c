use serde::Deserialize;

/// Envelope of the `/access/ticket` answer. PBS omits the CSRF token on some versions.
#[derive(Deserialize)]
pub struct LoginResponse {
    pub data: TicketData,
}

#[derive(Deserialize)]
pub struct TicketData {
    pub ticket: String,
    #[serde(rename = "CSRFPreventionToken", default)]
    pub csrf_token: Option<String>,
}
