//! Validation helpers for DTOs.

use validator::ValidationError;

/// Length of a session join code.
pub const SESSION_CODE_LENGTH: usize = 6;

/// Validates that a join code is exactly six uppercase alphanumeric characters.
pub fn validate_session_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != SESSION_CODE_LENGTH {
        let mut err = ValidationError::new("session_code_length");
        err.message = Some(
            format!(
                "Session code must be exactly {SESSION_CODE_LENGTH} characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    {
        let mut err = ValidationError::new("session_code_format");
        err.message =
            Some("Session code must contain only uppercase letters and digits".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_session_code_valid() {
        assert!(validate_session_code("AB12CD").is_ok());
        assert!(validate_session_code("ZZZZZZ").is_ok());
        assert!(validate_session_code("000000").is_ok());
    }

    #[test]
    fn test_validate_session_code_invalid_length() {
        assert!(validate_session_code("AB12C").is_err()); // too short
        assert!(validate_session_code("AB12CDE").is_err()); // too long
        assert!(validate_session_code("").is_err()); // empty
    }

    #[test]
    fn test_validate_session_code_invalid_format() {
        assert!(validate_session_code("ab12cd").is_err()); // lowercase
        assert!(validate_session_code("AB 2CD").is_err()); // space
        assert!(validate_session_code("AB12C!").is_err()); // punctuation
    }
}
