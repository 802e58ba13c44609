//! User identity rules.

use super::error::DomainError;

/// Accepts non-empty lowercase hexadecimal identifiers.
pub fn validate_user_id(value: &str) -> Result<(), DomainError> {
    let valid = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if valid {
        Ok(())
    } else {
        Err(DomainError::invalid_user_id(value))
    }
}
