//! Error handling and sanitization
//!
//! Turns a [`VeilError`] into the plain-text response the caller sees while
//! logging full details internally. Credentials and internal configuration
//! never reach the response body.

use axum::response::{IntoResponse, Response};
use edge_veil_common::VeilError;
use http::{HeaderValue, header};
use tracing::{error, warn};

/// Sanitize error messages for client responses
///
/// Logs the full error internally but returns a generic message to the client.
///
/// # Examples
///
/// ```
/// use edge_veil_common::VeilError;
/// use edge_veil_gateway::error_handling::sanitize_error;
///
/// let err = VeilError::Config("secret file /etc/veil/secret unreadable".to_string());
/// assert_eq!(sanitize_error(&err), "Internal server error");
/// ```
pub fn sanitize_error(e: &VeilError) -> String {
    error!("Internal error: {}", e);
    "Internal server error".to_string()
}

/// Check if an error's own message is safe to show to the client
///
/// Decode and size errors describe the caller's input; upstream and clock
/// errors are terse by construction. Configuration and internal errors may
/// carry deployment details and are sanitized.
pub fn is_safe_error(e: &VeilError) -> bool {
    !matches!(e, VeilError::Config(_) | VeilError::InternalError(_))
}

/// Get the body text sent to the client for an error
///
/// Authentication failures are answered with a bare `Forbidden`. Everything
/// else is prefixed by its error-class label.
pub fn get_client_error_message(e: &VeilError) -> String {
    if matches!(e, VeilError::Auth) {
        return "Forbidden".to_string();
    }

    let message = if is_safe_error(e) {
        if e.is_routine() {
            warn!("Rejected request: {}", e);
        } else {
            error!("Request failed: {}", e);
        }
        e.to_string()
    } else {
        sanitize_error(e)
    };

    format!("{}: {}", e.label(), message)
}

/// Build the plain-text error response
pub fn error_response(e: VeilError) -> Response {
    let status = e.status_code();
    let body = get_client_error_message(&e);

    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_sanitize_error_hides_details() {
        let err = VeilError::InternalError("pool exhausted at 10.0.1.5:8000".to_string());
        let sanitized = sanitize_error(&err);

        assert_eq!(sanitized, "Internal server error");
        assert!(!sanitized.contains("10.0.1.5"));
    }

    #[test]
    fn test_safe_errors_are_identified() {
        assert!(is_safe_error(&VeilError::Decode("empty token".into())));
        assert!(is_safe_error(&VeilError::UpstreamFetch("timed out".into())));
        assert!(is_safe_error(&VeilError::TimeFormat("bad zone".into())));
        assert!(is_safe_error(&VeilError::PayloadTooLarge(16)));
        assert!(!is_safe_error(&VeilError::Config("secret=abc".into())));
        assert!(!is_safe_error(&VeilError::InternalError("x".into())));
    }

    #[test]
    fn test_client_error_message() {
        assert_eq!(get_client_error_message(&VeilError::Auth), "Forbidden");

        let msg = get_client_error_message(&VeilError::Decode("empty token".into()));
        assert_eq!(msg, "Proxy Error: Invalid target: empty token");

        let msg = get_client_error_message(&VeilError::TimeFormat("no such zone".into()));
        assert_eq!(msg, "Clock Error: Time formatting error: no such zone");

        let msg = get_client_error_message(&VeilError::Config("secret=hunter2".into()));
        assert_eq!(msg, "Proxy Error: Internal server error");
        assert!(!msg.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_error_response() {
        let response = error_response(VeilError::Auth);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_text(response).await, "Forbidden");

        let response = error_response(VeilError::PayloadTooLarge(1024));
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = error_response(VeilError::UpstreamFetch("connection refused".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_text(response).await,
            "Proxy Error: Upstream fetch failed: connection refused"
        );
    }
}
