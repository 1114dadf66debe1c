use crate::core::domain::error::ValidationError;

const MIN_TOKEN_LEN: usize = 32;
const MAX_TOKEN_LEN: usize = 128;

/// Checks that a presented setup or auth token is 32-128 hex characters.
///
/// Anything else (whitespace, control characters, CR/LF smuggled into a URL
/// parameter) is rejected before the token is hashed or compared.
pub(crate) fn validate_token_format(raw: &str) -> Result<(), ValidationError> {
    if raw.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::Format(
            "Token contains invalid characters".to_string(),
        ));
    }
    if !(MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&raw.len()) {
        return Err(ValidationError::Format(format!(
            "Token length must be between {MIN_TOKEN_LEN} and {MAX_TOKEN_LEN} characters"
        )));
    }
    if !raw.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::Format(
            "Token must be hexadecimal".to_string(),
        ));
    }
    Ok(())
}

/// Log-safe form of a secret: first and last three characters.
pub fn token_hint(raw: &str) -> String {
    if raw.len() <= 6 || !raw.is_ascii() {
        return "…".to_string();
    }
    format!("{}…{}", &raw[..3], &raw[raw.len() - 3..])
}
