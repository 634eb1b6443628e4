//! Validation helpers for DTOs.

use validator::ValidationError;

/// Length of a room join code.
pub const JOIN_CODE_LENGTH: usize = 6;

/// Characters a join code is generated from. Ambiguous glyphs (O/0, I/1) are
/// left out so codes survive being read aloud.
pub const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Validates that a join code is exactly 6 characters from the code alphabet.
///
/// # Examples
///
/// ```ignore
/// validate_join_code("BBALL7") // Ok
/// validate_join_code("bball7") // Err - lowercase
/// validate_join_code("BBAL")   // Err - too short
/// ```
pub fn validate_join_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != JOIN_CODE_LENGTH {
        let mut err = ValidationError::new("join_code_length");
        err.message = Some(
            format!(
                "Join code must be exactly {} characters (got {})",
                JOIN_CODE_LENGTH,
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code
        .bytes()
        .all(|byte| JOIN_CODE_ALPHABET.contains(&byte))
    {
        let mut err = ValidationError::new("join_code_format");
        err.message = Some("Join code must contain only uppercase letters and digits".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_join_code_valid() {
        assert!(validate_join_code("BBALL7").is_ok());
        assert!(validate_join_code("XYZ234").is_ok());
        assert!(validate_join_code("AAAAAA").is_ok());
    }

    #[test]
    fn test_validate_join_code_invalid_length() {
        assert!(validate_join_code("BBAL").is_err()); // too short
        assert!(validate_join_code("BBALL77").is_err()); // too long
        assert!(validate_join_code("").is_err()); // empty
    }

    #[test]
    fn test_validate_join_code_invalid_format() {
        assert!(validate_join_code("bball7").is_err()); // lowercase
        assert!(validate_join_code("BBALL0").is_err()); // ambiguous zero
        assert!(validate_join_code("BBALL!").is_err()); // punctuation
        assert!(validate_join_code("BBA LL").is_err()); // space
    }
}
