//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted user identifier.
pub const MAX_USER_ID_LENGTH: usize = 64;

/// Validates an opaque user identifier: 1 to 64 visible characters without
/// whitespace.
///
/// # Examples
///
/// ```ignore
/// validate_user_id("uid-42")   // Ok
/// validate_user_id("")         // Err - empty
/// validate_user_id("a b")      // Err - whitespace
/// ```
pub fn validate_user_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.chars().count() > MAX_USER_ID_LENGTH {
        let mut err = ValidationError::new("user_id_length");
        err.message = Some(
            format!(
                "User ID must be 1 to {MAX_USER_ID_LENGTH} characters (got {})",
                id.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        let mut err = ValidationError::new("user_id_format");
        err.message = Some("User ID must not contain whitespace or control characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_user_id_valid() {
        assert!(validate_user_id("alice").is_ok());
        assert!(validate_user_id("f3c1e2d4-uid").is_ok());
        assert!(validate_user_id(&"x".repeat(MAX_USER_ID_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_user_id_invalid_length() {
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id(&"x".repeat(MAX_USER_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_user_id_invalid_format() {
        assert!(validate_user_id("a b").is_err());
        assert!(validate_user_id("tab\there").is_err());
        assert!(validate_user_id("line\n").is_err());
    }
}
