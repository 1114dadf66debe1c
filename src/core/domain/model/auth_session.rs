/// Ticket and CSRF token obtained from `/access/ticket`.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    ticket: String,
    csrf_token: Option<String>,
}

impl AuthSession {
    pub fn new(ticket: impl Into<String>, csrf_token: Option<String>) -> Self {
        Self {
            ticket: ticket.into(),
            csrf_token,
        }
    }

    pub fn ticket(&self) -> &str {
        &self.ticket
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("ticket", &"[redacted]")
            .field("csrf_token", &self.csrf_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}
