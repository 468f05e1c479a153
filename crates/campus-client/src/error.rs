//! Error types for backend calls.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Result type alias for backend calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Fields the backend uses for a human-readable message, in lookup order.
const MESSAGE_FIELDS: [&str; 4] = ["message", "mensaje", "error", "detail"];

/// Errors that can occur while talking to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP 401. The session has already been cleared when this is returned.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Any other 4xx.
    #[error("request rejected ({status}): {}", .message.as_deref().unwrap_or("no message"))]
    Validation { status: u16, message: Option<String> },

    /// 5xx.
    #[error("server error ({status}): {}", .message.as_deref().unwrap_or("no message"))]
    Server { status: u16, message: Option<String> },

    /// A success response whose body was not the JSON we expected.
    #[error("decode error: {0}")]
    Decode(String),

    /// The request could not be built (bad URL, bad header value).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Classify a non-success status with its (possibly empty) JSON body.
    pub fn from_status(status: u16, body: &Value) -> Self {
        let message = extract_message(body);
        match status {
            401 => ApiError::Unauthorized(
                message.unwrap_or_else(|| "session expired".to_string()),
            ),
            400..=499 => ApiError::Validation { status, message },
            _ => ApiError::Server { status, message },
        }
    }

    /// Whether a read that failed this way may be retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::Timeout(_) | ApiError::Server { .. }
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Text suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            ApiError::Timeout(_) => "The server took too long to respond.".to_string(),
            ApiError::Unauthorized(_) => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ApiError::Validation { message, .. } => message
                .clone()
                .unwrap_or_else(|| "The request was rejected by the server.".to_string()),
            ApiError::Server { .. } => {
                "The server could not complete the request. Try again later.".to_string()
            }
            ApiError::Decode(_) => "Unexpected response from the server.".to_string(),
            ApiError::InvalidRequest(msg) => msg.clone(),
        }
    }
}

/// Pull a human-readable message out of a backend error body.
///
/// Checks the top level first, then an `info` wrapper. A nested
/// `{ error: { message } }` is also accepted.
pub fn extract_message(body: &Value) -> Option<String> {
    fn from_object(value: &Value) -> Option<String> {
        let obj = value.as_object()?;
        for field in MESSAGE_FIELDS {
            match obj.get(field) {
                Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.clone()),
                Some(nested @ Value::Object(_)) => {
                    if let Some(msg) = from_object(nested) {
                        return Some(msg);
                    }
                }
                _ => {}
            }
        }
        None
    }

    from_object(body).or_else(|| body.get("info").and_then(from_object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_statuses() {
        assert!(matches!(
            ApiError::from_status(401, &Value::Null),
            ApiError::Unauthorized(_)
        ));
        assert_eq!(
            ApiError::from_status(422, &json!({"message": "DNI ya registrado"})),
            ApiError::Validation {
                status: 422,
                message: Some("DNI ya registrado".to_string())
            }
        );
        assert!(matches!(
            ApiError::from_status(503, &Value::Null),
            ApiError::Server { status: 503, message: None }
        ));
    }

    #[test]
    fn message_lookup_order() {
        let body = json!({"error": "second", "message": "first"});
        assert_eq!(extract_message(&body).as_deref(), Some("first"));

        let body = json!({"mensaje": "aula llena"});
        assert_eq!(extract_message(&body).as_deref(), Some("aula llena"));

        let body = json!({"info": {"message": "wrapped"}});
        assert_eq!(extract_message(&body).as_deref(), Some("wrapped"));

        let body = json!({"error": {"message": "nested"}});
        assert_eq!(extract_message(&body).as_deref(), Some("nested"));

        assert_eq!(extract_message(&json!({"message": "  "})), None);
        assert_eq!(extract_message(&json!([1, 2])), None);
    }

    #[test]
    fn validation_message_is_verbatim() {
        let err = ApiError::from_status(400, &json!({"message": "El grado es obligatorio"}));
        assert_eq!(err.user_message(), "El grado es obligatorio");
    }

    #[test]
    fn server_errors_use_generic_framing() {
        let err = ApiError::from_status(500, &json!({"message": "stack trace here"}));
        assert!(err.user_message().contains("Try again later"));
    }

    #[test]
    fn retry_classification() {
        assert!(ApiError::Network("reset".into()).is_retryable());
        assert!(ApiError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(ApiError::Server { status: 502, message: None }.is_retryable());
        assert!(!ApiError::Unauthorized("x".into()).is_retryable());
        assert!(!ApiError::Validation { status: 400, message: None }.is_retryable());
    }
}
