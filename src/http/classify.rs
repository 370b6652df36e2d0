//! Response error classification for the bearer-auth client.
//!
//! Failed responses fall into one of three dispositions, evaluated in
//! order: permission denied (backend payload `statusCode` 403), expired
//! access token (recoverable via the refresh protocol), or plain
//! propagation.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::auth::{REFRESH_TOKEN_PATH, SIGNIN_PATH_FRAGMENT};

/// Messages the backend uses for an expired or invalid access token.
const TOKEN_INVALID_MESSAGES: [&str; 2] = ["Error validating access token", "Unauthorized"];

/// JSON error body returned by the backend. The backend nests the
/// machine-readable message one level down, under `response.message`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorPayload {
    #[serde(rename = "statusCode")]
    pub status_code: Option<u16>,
    pub message: Option<String>,
    pub response: Option<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorDetail {
    pub message: Option<String>,
}

impl ErrorPayload {
    /// Best-effort parse of an error body. Anything that is not the
    /// expected JSON shape classifies as an empty payload.
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn detail_message(&self) -> Option<&str> {
        self.response.as_ref().and_then(|d| d.message.as_deref())
    }

    /// Human-readable message for error display.
    pub fn display_message(&self) -> String {
        self.detail_message()
            .or(self.message.as_deref())
            .unwrap_or_default()
            .to_string()
    }
}

/// Typed errors surfaced by the client layer. Carried inside
/// `anyhow::Error` so callers can downcast when they need the category.
#[derive(Debug)]
pub enum ApiError {
    /// The backend rejected the caller's permissions (payload
    /// `statusCode` 403). Not recoverable at this layer.
    PermissionDenied(String),
    /// The access token expired or is invalid; recoverable once via the
    /// refresh protocol.
    ExpiredToken(String),
    /// Any other failed response, propagated unchanged.
    Http { status: u16, message: String },
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::PermissionDenied(msg) => {
                write!(f, "Permission denied: {}", msg)
            }
            ApiError::ExpiredToken(msg) => {
                write!(f, "Access token rejected: {}", msg)
            }
            ApiError::Http { status, message } => {
                write!(f, "HTTP {} error: {}", status, message)
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// Disposition chosen by the ordered classification rules.
#[derive(Debug, PartialEq, Eq)]
pub enum Recovery {
    /// Notify the user and redirect to the profile page; no recovery.
    PermissionDenied,
    /// Clear the stored access token and run the refresh protocol.
    RefreshToken,
    /// Surface the error unchanged.
    Propagate,
}

/// Classifies a failed response.
///
/// The refresh path is taken only when all of the following hold: the
/// transport status is 401, the request did not target the refresh or
/// sign-in endpoints (prevents infinite refresh loops), the payload
/// carries one of the known token-invalid messages, and execution is in a
/// client context (a server context has nowhere to persist a rotated
/// token).
pub fn classify_response(
    status: StatusCode,
    path: &str,
    payload: &ErrorPayload,
    is_server: bool,
) -> Recovery {
    if payload.status_code == Some(403) {
        return Recovery::PermissionDenied;
    }

    if status == StatusCode::UNAUTHORIZED
        && !path.contains(REFRESH_TOKEN_PATH)
        && !path.contains(SIGNIN_PATH_FRAGMENT)
        && payload
            .detail_message()
            .is_some_and(|m| TOKEN_INVALID_MESSAGES.contains(&m))
        && !is_server
    {
        return Recovery::RefreshToken;
    }

    Recovery::Propagate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expired_payload(message: &str) -> ErrorPayload {
        ErrorPayload {
            status_code: None,
            message: None,
            response: Some(ErrorDetail {
                message: Some(message.to_string()),
            }),
        }
    }

    #[test]
    fn test_payload_status_403_is_permission_denied() {
        let payload = ErrorPayload {
            status_code: Some(403),
            ..Default::default()
        };
        assert_eq!(
            classify_response(StatusCode::FORBIDDEN, "/orders", &payload, false),
            Recovery::PermissionDenied
        );
    }

    #[test]
    fn test_payload_status_403_wins_over_expired_token_shape() {
        // Rule order: the payload-level 403 is checked first.
        let payload = ErrorPayload {
            status_code: Some(403),
            message: None,
            response: Some(ErrorDetail {
                message: Some("Unauthorized".to_string()),
            }),
        };
        assert_eq!(
            classify_response(StatusCode::UNAUTHORIZED, "/orders", &payload, false),
            Recovery::PermissionDenied
        );
    }

    #[test]
    fn test_401_with_known_messages_is_refresh() {
        for message in ["Error validating access token", "Unauthorized"] {
            assert_eq!(
                classify_response(
                    StatusCode::UNAUTHORIZED,
                    "/orders",
                    &expired_payload(message),
                    false
                ),
                Recovery::RefreshToken
            );
        }
    }

    #[test]
    fn test_401_with_unknown_message_propagates() {
        assert_eq!(
            classify_response(
                StatusCode::UNAUTHORIZED,
                "/orders",
                &expired_payload("Token signature mismatch"),
                false
            ),
            Recovery::Propagate
        );
    }

    #[test]
    fn test_401_without_payload_message_propagates() {
        assert_eq!(
            classify_response(
                StatusCode::UNAUTHORIZED,
                "/orders",
                &ErrorPayload::default(),
                false
            ),
            Recovery::Propagate
        );
    }

    #[test]
    fn test_refresh_endpoint_never_refreshes() {
        assert_eq!(
            classify_response(
                StatusCode::UNAUTHORIZED,
                REFRESH_TOKEN_PATH,
                &expired_payload("Unauthorized"),
                false
            ),
            Recovery::Propagate
        );
    }

    #[test]
    fn test_signin_endpoint_never_refreshes() {
        assert_eq!(
            classify_response(
                StatusCode::UNAUTHORIZED,
                "/auth/signin",
                &expired_payload("Unauthorized"),
                false
            ),
            Recovery::Propagate
        );
    }

    #[test]
    fn test_server_context_never_refreshes() {
        assert_eq!(
            classify_response(
                StatusCode::UNAUTHORIZED,
                "/orders",
                &expired_payload("Unauthorized"),
                true
            ),
            Recovery::Propagate
        );
    }

    #[test]
    fn test_other_statuses_propagate() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::FORBIDDEN,
            StatusCode::NOT_FOUND,
            StatusCode::INTERNAL_SERVER_ERROR,
        ] {
            assert_eq!(
                classify_response(status, "/orders", &expired_payload("Unauthorized"), false),
                Recovery::Propagate
            );
        }
    }

    #[test]
    fn test_payload_parse_nested_message() {
        let payload =
            ErrorPayload::parse(r#"{"statusCode": 401, "response": {"message": "Unauthorized"}}"#);
        assert_eq!(payload.status_code, Some(401));
        assert_eq!(payload.detail_message(), Some("Unauthorized"));
    }

    #[test]
    fn test_payload_parse_garbage_defaults() {
        let payload = ErrorPayload::parse("<html>Bad Gateway</html>");
        assert_eq!(payload.status_code, None);
        assert_eq!(payload.detail_message(), None);
        assert_eq!(payload.display_message(), "");
    }

    #[test]
    fn test_display_message_prefers_detail() {
        let payload = ErrorPayload {
            status_code: None,
            message: Some("outer".to_string()),
            response: Some(ErrorDetail {
                message: Some("inner".to_string()),
            }),
        };
        assert_eq!(payload.display_message(), "inner");
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::PermissionDenied("nope".to_string());
        assert!(err.to_string().contains("Permission denied"));

        let err = ApiError::ExpiredToken("Unauthorized".to_string());
        assert!(err.to_string().contains("Access token rejected"));

        let err = ApiError::Http {
            status: 502,
            message: "Bad Gateway".to_string(),
        };
        assert!(err.to_string().contains("502"));
    }
}
