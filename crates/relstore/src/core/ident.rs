//! Validation of SQL names (tables and columns).
//!
//! Table and column names are spliced into generated statements unquoted, so
//! that the same text works across every dialect's case-folding rules. Only
//! data values are bound as parameters; names cannot be, which is why every
//! name passes through [`validate_name`] before a statement is built.
//!
//! Accepted names start with an ASCII letter or underscore and continue with
//! ASCII letters, digits or underscores. Anything else (quotes, whitespace,
//! semicolons, comment markers) is rejected outright instead of escaped.

use crate::error::{Result, StoreError};

/// Maximum name length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
/// - SQLite/H2: effectively unlimited
const MAX_NAME_LENGTH: usize = 63;

/// Validate a table or column name.
///
/// # Errors
///
/// Returns `StoreError::Config` describing the first problem found.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::config("SQL name cannot be empty"));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(StoreError::config(format!(
            "SQL name exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_NAME_LENGTH,
            name.len(),
            name
        )));
    }

    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !first_ok {
        return Err(StoreError::config(format!(
            "SQL name must start with a letter or underscore: {:?}",
            name
        )));
    }

    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(StoreError::config(format!(
            "SQL name contains invalid character {:?}: {:?}",
            bad, name
        )));
    }

    Ok(())
}

/// Whether two names refer to the same column.
///
/// Unquoted names fold case in every supported dialect.
pub fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_normal() {
        assert!(validate_name("users").is_ok());
        assert!(validate_name("my_table").is_ok());
        assert!(validate_name("Table123").is_ok());
        assert!(validate_name("_private").is_ok());
    }

    #[test]
    fn test_validate_name_rejects_empty() {
        let result = validate_name("");
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_name_rejects_too_long() {
        let long_name = "a".repeat(MAX_NAME_LENGTH + 1);
        let result = validate_name(&long_name);
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_validate_name_accepts_max_length() {
        let max_name = "a".repeat(MAX_NAME_LENGTH);
        assert!(validate_name(&max_name).is_ok());
    }

    #[test]
    fn test_validate_name_rejects_leading_digit() {
        assert!(validate_name("1table").is_err());
    }

    #[test]
    fn test_validate_name_rejects_injection() {
        let result = validate_name("users; DROP TABLE students");
        assert!(result.unwrap_err().to_string().contains("invalid character"));
        assert!(validate_name("users--").is_err());
        assert!(validate_name("a\"b").is_err());
        assert!(validate_name("table\0name").is_err());
        assert!(validate_name("日本語").is_err());
    }

    #[test]
    fn test_same_name_ignores_case() {
        assert!(same_name("Version", "version"));
        assert!(!same_name("version", "versions"));
    }
}
