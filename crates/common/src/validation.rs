//! Input validation for security-critical data
//!
//! This module validates user-supplied input (decoded targets, credentials,
//! catch-all paths) before it reaches the origin fetcher, so that malformed
//! data is rejected with a 400 instead of producing odd outbound requests.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::constants::{CREDENTIAL_LEN, MAX_TARGET_URL_LENGTH};

/// Regex for validating credentials (lowercase hex of the expected length)
static CREDENTIAL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^[0-9a-f]{{{}}}$", CREDENTIAL_LEN)).expect("Invalid regex"));

/// Maximum length for catch-all paths
pub const MAX_PATH_LENGTH: usize = 2048;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("URL too long: {0} bytes (max: {1})")]
    TargetTooLong(usize, usize),

    #[error("URL is not parseable: {0}")]
    UnparseableUrl(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("Path too long: {0} bytes (max: {1})")]
    PathTooLong(usize, usize),
}

/// Validate a decoded target URL
///
/// Targets must be absolute `http`/`https` URLs with a host.
///
/// # Examples
///
/// ```
/// use edge_veil_common::validation::validate_target_url;
///
/// assert!(validate_target_url("https://example.com/a.html").is_ok());
/// assert!(validate_target_url("ftp://example.com/").is_err());
/// assert!(validate_target_url("not a url").is_err());
/// ```
pub fn validate_target_url(raw: &str) -> Result<Url, ValidationError> {
    if raw.len() > MAX_TARGET_URL_LENGTH {
        return Err(ValidationError::TargetTooLong(
            raw.len(),
            MAX_TARGET_URL_LENGTH,
        ));
    }

    let url = Url::parse(raw).map_err(|e| ValidationError::UnparseableUrl(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::UnsupportedScheme(
            url.scheme().chars().take(16).collect::<String>(), // Limit error message
        ));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(ValidationError::MissingHost),
    }
}

/// Check that a supplied credential has the shape of a real one
///
/// This runs before any hashing so junk values are rejected cheaply.
pub fn is_well_formed_credential(code: &str) -> bool {
    CREDENTIAL_REGEX.is_match(code)
}

/// Validate and sanitize a catch-all path
///
/// - Removes control characters
/// - Enforces length limits
/// - Ensures path starts with /
pub fn validate_path(path: &str) -> Result<String, ValidationError> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(ValidationError::PathTooLong(path.len(), MAX_PATH_LENGTH));
    }

    let sanitized: String = path.chars().filter(|c| !c.is_control()).collect();

    if sanitized.is_empty() {
        Ok("/".to_string())
    } else if sanitized.starts_with('/') {
        Ok(sanitized)
    } else {
        Ok(format!("/{}", sanitized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_target_url_valid() {
        assert!(validate_target_url("https://example.com").is_ok());
        assert!(validate_target_url("http://127.0.0.1:8080/a?b=c").is_ok());
        assert!(validate_target_url("https://www.google.com/search?q=rust").is_ok());
    }

    #[test]
    fn test_validate_target_url_invalid() {
        assert!(matches!(
            validate_target_url("ftp://example.com/"),
            Err(ValidationError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            validate_target_url("javascript:alert(1)"),
            Err(ValidationError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            validate_target_url("example.com/no-scheme"),
            Err(ValidationError::UnparseableUrl(_))
        ));
        assert!(validate_target_url("https://").is_err());
    }

    #[test]
    fn test_validate_target_url_too_long() {
        let long = format!("https://example.com/{}", "a".repeat(MAX_TARGET_URL_LENGTH));
        assert!(matches!(
            validate_target_url(&long),
            Err(ValidationError::TargetTooLong(_, _))
        ));
    }

    #[test]
    fn test_credential_shape() {
        assert!(is_well_formed_credential("fefdace1"));
        assert!(is_well_formed_credential("00000000"));

        assert!(!is_well_formed_credential("")); // empty
        assert!(!is_well_formed_credential("FEFDACE1")); // uppercase
        assert!(!is_well_formed_credential("fefdace")); // too short
        assert!(!is_well_formed_credential("fefdace12")); // too long
        assert!(!is_well_formed_credential("fefdacez")); // not hex
    }

    #[test]
    fn test_validate_path() {
        assert_eq!(validate_path("/search").unwrap(), "/search");
        assert_eq!(validate_path("search").unwrap(), "/search");
        assert_eq!(validate_path("").unwrap(), "/");

        let path_with_controls = "/foo\x00/bar\n/baz";
        let sanitized = validate_path(path_with_controls).unwrap();
        assert!(!sanitized.contains('\x00'));
        assert!(!sanitized.contains('\n'));

        let long_path = "/".to_string() + &"a".repeat(3000);
        assert!(validate_path(&long_path).is_err());
    }
}
