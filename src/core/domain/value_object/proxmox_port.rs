use crate::core::domain::error::ValidationError;

/// Validates a port number.
pub(crate) fn validate_port(port: u16) -> Result<(), ValidationError> {
    if port == 0 {
        return Err(ValidationError::Field {
            field: "port".to_string(),
            message: "Invalid port number. Port must be between 1 and 65535".to_string(),
        });
    }
    // All ports 1-65535 are valid.
    Ok(())
}

/// Parses the port part of a host string.
pub(crate) fn parse_port(raw: &str) -> Result<u16, ValidationError> {
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::field(
            "port",
            "Invalid port number. Port must be between 1 and 65535",
        ));
    }
    let port: u16 = raw.parse().map_err(|_| {
        ValidationError::field(
            "port",
            "Invalid port number. Port must be between 1 and 65535",
        )
    })?;
    validate_port(port)?;
    Ok(port)
}
