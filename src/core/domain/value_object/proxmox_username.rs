use crate::core::domain::{error::ValidationError, value_object::NodeKind};

/// Appends the kind's default realm to a user name that has none.
///
/// `root` becomes `root@pam` for PVE, `admin` becomes `admin@pbs` for PBS. Names that
/// already carry a realm, and empty names, are returned trimmed but otherwise unchanged.
pub fn normalize_username(username: &str, kind: NodeKind) -> String {
    let trimmed = username.trim();
    if trimmed.is_empty() || trimmed.contains('@') {
        return trimmed.to_string();
    }
    format!("{}@{}", trimmed, kind.default_realm())
}

/// Validates a username or token ID before it is sent upstream.
pub(crate) fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::Field {
            field: "user".to_string(),
            message: "Username cannot be empty".to_string(),
        });
    }
    if username.len() > 128 {
        return Err(ValidationError::Format(format!(
            "Username length must not exceed 128 characters (got {})",
            username.len()
        )));
    }
    if username
        .chars()
        .any(|c| c.is_control() || c.is_whitespace() || c == ':')
    {
        return Err(ValidationError::Format(
            "Username contains invalid characters".to_string(),
        ));
    }
    Ok(())
}
