use http::StatusCode;
use thiserror::Error;

use crate::validation::ValidationError;

/// Error types for the edge-veil gateway
#[derive(Error, Debug)]
pub enum VeilError {
    #[error("Invalid target: {0}")]
    Decode(String),

    #[error("Credential missing or incorrect")]
    Auth,

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("Rewrite failed: {0}")]
    Rewrite(String),

    #[error("Time formatting error: {0}")]
    TimeFormat(String),

    #[error("Request body too large: {0} bytes max")]
    PayloadTooLarge(usize),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl VeilError {
    /// HTTP status this error is answered with
    pub fn status_code(&self) -> StatusCode {
        match self {
            VeilError::Decode(_) | VeilError::Base64Error(_) => StatusCode::BAD_REQUEST,
            VeilError::Auth => StatusCode::FORBIDDEN,
            VeilError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            VeilError::UpstreamFetch(_)
            | VeilError::Rewrite(_)
            | VeilError::TimeFormat(_)
            | VeilError::Config(_)
            | VeilError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error-class label prefixed to plain-text error bodies
    pub fn label(&self) -> &'static str {
        match self {
            VeilError::TimeFormat(_) => "Clock Error",
            _ => "Proxy Error",
        }
    }

    /// Whether this error is a routine outcome of the normal request path
    pub fn is_routine(&self) -> bool {
        matches!(
            self,
            VeilError::Decode(_) | VeilError::Base64Error(_) | VeilError::Auth
        )
    }
}

impl From<ValidationError> for VeilError {
    fn from(err: ValidationError) -> Self {
        VeilError::Decode(err.to_string())
    }
}

/// Type alias for Results using VeilError
pub type Result<T> = std::result::Result<T, VeilError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VeilError::Decode("token is not valid UTF-8".to_string());
        assert_eq!(err.to_string(), "Invalid target: token is not valid UTF-8");

        let err = VeilError::Auth;
        assert_eq!(err.to_string(), "Credential missing or incorrect");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            VeilError::Decode("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(VeilError::Auth.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            VeilError::UpstreamFetch("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            VeilError::TimeFormat("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            VeilError::PayloadTooLarge(10).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn test_error_conversion() {
        use base64::Engine as _;
        let b64_err = base64::engine::general_purpose::STANDARD.decode("!!!");
        assert!(b64_err.is_err());

        let err: VeilError = b64_err.unwrap_err().into();
        assert!(matches!(err, VeilError::Base64Error(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.is_routine());
    }

    #[test]
    fn test_validation_error_is_decode_class() {
        let err: VeilError = ValidationError::MissingHost.into();
        assert!(matches!(err, VeilError::Decode(_)));
    }

    #[test]
    fn test_labels() {
        assert_eq!(VeilError::Auth.label(), "Proxy Error");
        assert_eq!(VeilError::TimeFormat("x".into()).label(), "Clock Error");
    }
}
