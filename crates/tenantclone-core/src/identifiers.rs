//! SQL identifier validation for table and column names.
//!
//! Descriptors name tables and columns that end up interpolated into SQL, so
//! every name is validated when a clone plan is built and quoted when a query
//! is assembled.

use crate::error::{Error, Result};

/// PostgreSQL identifier length limit.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Validate a table or column name.
///
/// Identifiers must:
/// - Not be empty
/// - Not exceed 63 characters
/// - Contain only ASCII alphanumerics and underscores
/// - Not start with a digit
///
/// # Examples
///
/// ```
/// use tenantclone_core::identifiers::validate_identifier;
///
/// assert!(validate_identifier("pricingplan_features").is_ok());
/// assert!(validate_identifier("1table").is_err());
/// assert!(validate_identifier("product; DROP TABLE product").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::InvalidInput(format!(
            "Identifier '{}' exceeds {} character limit",
            name, MAX_IDENTIFIER_LEN
        )));
    }

    if let Some(first) = name.chars().next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(Error::InvalidInput(format!(
                "Identifier '{}' must start with a letter or underscore",
                name
            )));
        }
    }

    if let Some(ch) = name
        .chars()
        .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_')
    {
        return Err(Error::InvalidInput(format!(
            "Identifier '{}' contains invalid character: '{}'",
            name, ch
        )));
    }

    Ok(())
}

/// Double-quote a validated identifier for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}
