// crates/backend-lib/src/handlers/mod.rs

//! HTTP handlers.

pub mod control;
pub mod page;
pub mod status;
pub mod webhook;

use crate::error::AppError;

const MAX_USER_ID_LEN: usize = 256;

/// Reject user identifiers that are empty, oversized or carry control characters
pub(crate) fn validate_user_id(user_id: &str) -> Result<(), AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::InvalidInput("user id must not be empty".to_string()));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(AppError::InvalidInput(format!(
            "user id longer than {MAX_USER_ID_LEN} bytes"
        )));
    }
    if user_id.chars().any(char::is_control) {
        return Err(AppError::InvalidInput("user id contains control characters".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("glasses.user@example.com").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("   ").is_err());
        assert!(validate_user_id("bad\nid").is_err());
        assert!(validate_user_id(&"x".repeat(MAX_USER_ID_LEN + 1)).is_err());
    }
}
